use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use timebank_core::domain::grant::{
    CalculationBasis, Grant, GrantApprovalStatus, GrantId, GrantKind,
};
use timebank_core::domain::job::{JobRun, SubjectOutcome};
use timebank_core::domain::subject::SubjectProfile;

use crate::calendar::{next_quarter_end, previous_quarter, quarter_start};
use crate::directory::DateRange;
use crate::runner::{run_job, GrantJobContext, JobError};

pub const ATTENDANCE_JOB: &str = "attendance_award";

/// Once per quarter, awards 1.0 day for a spotless prior quarter: zero
/// late arrivals and at least one worked day.
pub struct AttendanceAwardJob {
    ctx: GrantJobContext,
}

impl AttendanceAwardJob {
    pub fn new(ctx: GrantJobContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, today: NaiveDate) -> Result<JobRun, JobError> {
        let business_date = quarter_start(today);
        let (prior_start, prior_end) = previous_quarter(today);
        let expiration_date = next_quarter_end(today);
        let ledger = self.ctx.ledger.clone();
        let directory = self.ctx.directory.clone();

        run_job(&self.ctx, ATTENDANCE_JOB, business_date, move |profile| {
            let ledger = ledger.clone();
            let directory = directory.clone();
            async move {
                let subject = profile.id.clone();
                let result = evaluate(
                    &ledger,
                    directory.as_ref(),
                    &profile,
                    business_date,
                    DateRange { start: prior_start, end: prior_end },
                    expiration_date,
                )
                .await;
                match result {
                    Ok(outcome) => outcome,
                    Err(reason) => SubjectOutcome::Failed { subject, reason },
                }
            }
        })
        .await
    }
}

async fn evaluate(
    ledger: &timebank_engine::LedgerService,
    directory: &dyn crate::directory::SubjectDirectory,
    profile: &SubjectProfile,
    business_date: NaiveDate,
    prior_quarter: DateRange,
    expiration_date: NaiveDate,
) -> Result<SubjectOutcome, String> {
    let subject = profile.id.clone();

    let summary = directory
        .attendance(&profile.id, prior_quarter)
        .await
        .map_err(|error| error.to_string())?;

    if summary.late_arrivals > 0 {
        return Ok(SubjectOutcome::Skipped {
            subject,
            reason: format!("{} late arrivals in the prior quarter", summary.late_arrivals),
        });
    }
    if summary.worked_days == 0 {
        return Ok(SubjectOutcome::Skipped {
            subject,
            reason: "no worked days in the prior quarter".to_string(),
        });
    }

    let grant = Grant {
        id: GrantId(format!("GRT-{}", Uuid::new_v4())),
        subject: subject.clone(),
        kind: GrantKind::AttendanceAward,
        amount: Decimal::ONE,
        granted_date: business_date,
        expiration_date,
        approval_status: GrantApprovalStatus::Approved,
        calculation_basis: CalculationBasis::new("quarterly_attendance_award")
            .with_input("quarter_start", prior_quarter.start.to_string())
            .with_input("quarter_end", prior_quarter.end.to_string())
            .with_input("worked_days", summary.worked_days.to_string())
            .with_input("late_arrivals", summary.late_arrivals.to_string()),
        created_at: Utc::now(),
    };

    match ledger.record_grant(grant).await {
        Ok(true) => Ok(SubjectOutcome::Granted { subject }),
        Ok(false) => Ok(SubjectOutcome::Skipped {
            subject,
            reason: "attendance award already issued for this quarter".to_string(),
        }),
        Err(error) => Err(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use timebank_core::audit::InMemoryAuditSink;
    use timebank_core::config::JobsConfig;
    use timebank_core::domain::grant::GrantKind;
    use timebank_core::domain::subject::{
        AttendanceRecord, EmploymentStatus, SubjectId, SubjectProfile,
    };
    use timebank_db::{InMemoryJobRunStore, InMemoryLedgerStore, LedgerStore};
    use timebank_engine::LedgerService;

    use crate::directory::InMemorySubjectDirectory;
    use crate::runner::GrantJobContext;

    use super::AttendanceAwardJob;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn profile(id: &str) -> SubjectProfile {
        SubjectProfile {
            id: SubjectId(id.to_string()),
            hire_date: date(2024, 5, 1),
            status: EmploymentStatus::Active,
        }
    }

    fn record(day_date: NaiveDate, late: bool) -> AttendanceRecord {
        AttendanceRecord { date: day_date, worked: true, late }
    }

    fn context(
        directory: InMemorySubjectDirectory,
    ) -> (GrantJobContext, Arc<InMemoryLedgerStore>) {
        let ledger_store = Arc::new(InMemoryLedgerStore::default());
        let ledger =
            LedgerService::new(ledger_store.clone(), Arc::new(InMemoryAuditSink::default()));
        let ctx = GrantJobContext {
            ledger,
            directory: Arc::new(directory),
            runs: Arc::new(InMemoryJobRunStore::default()),
            config: JobsConfig {
                batch_size: 10,
                monthly_late_limit: 2,
                annual_base_days: 15,
                manual_deduction_min_privilege: 3,
            },
        };
        (ctx, ledger_store)
    }

    #[tokio::test]
    async fn clean_quarter_earns_the_award() {
        let subject = SubjectId("emp-clean".to_string());
        let directory = InMemorySubjectDirectory::new(vec![profile("emp-clean")])
            .with_attendance(
                &subject,
                vec![record(date(2026, 4, 6), false), record(date(2026, 5, 11), false)],
            );
        let (ctx, ledger_store) = context(directory);

        // Triggered at the start of Q3; Q2 is evaluated.
        let run = AttendanceAwardJob::new(ctx).run(date(2026, 7, 1)).await.expect("run");
        assert_eq!(run.granted, 1);
        assert_eq!(run.business_date, date(2026, 7, 1));

        let grants = ledger_store.grants_for(&subject).await.expect("grants");
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].kind, GrantKind::AttendanceAward);
        assert_eq!(grants[0].amount, Decimal::ONE);
        assert_eq!(grants[0].granted_date, date(2026, 7, 1));
        assert_eq!(grants[0].expiration_date, date(2026, 12, 31));
    }

    #[tokio::test]
    async fn one_late_arrival_forfeits_the_award() {
        let subject = SubjectId("emp-late".to_string());
        let directory = InMemorySubjectDirectory::new(vec![profile("emp-late")]).with_attendance(
            &subject,
            vec![record(date(2026, 4, 6), false), record(date(2026, 5, 11), true)],
        );
        let (ctx, ledger_store) = context(directory);

        let run = AttendanceAwardJob::new(ctx).run(date(2026, 7, 1)).await.expect("run");
        assert_eq!(run.granted, 0);
        assert_eq!(run.skipped, 1);
        assert!(ledger_store.grants_for(&subject).await.expect("grants").is_empty());
    }

    #[tokio::test]
    async fn no_worked_days_means_no_award() {
        let directory = InMemorySubjectDirectory::new(vec![profile("emp-absent")]);
        let (ctx, ledger_store) = context(directory);

        let run = AttendanceAwardJob::new(ctx).run(date(2026, 7, 1)).await.expect("run");
        assert_eq!(run.granted, 0);
        assert_eq!(run.skipped, 1);
        assert!(ledger_store
            .grants_for(&SubjectId("emp-absent".to_string()))
            .await
            .expect("grants")
            .is_empty());
    }

    #[tokio::test]
    async fn quarterly_rerun_reuses_the_recorded_run() {
        let subject = SubjectId("emp-clean".to_string());
        let directory = InMemorySubjectDirectory::new(vec![profile("emp-clean")])
            .with_attendance(&subject, vec![record(date(2026, 4, 6), false)]);
        let (ctx, ledger_store) = context(directory);
        let job = AttendanceAwardJob::new(ctx);

        let first = job.run(date(2026, 7, 1)).await.expect("first");
        // Any trigger date inside Q3 resolves to the same business date.
        let second = job.run(date(2026, 8, 15)).await.expect("second");
        assert_eq!(second.id, first.id);

        assert_eq!(ledger_store.grants_for(&subject).await.expect("grants").len(), 1);
    }
}
