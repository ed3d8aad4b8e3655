use chrono::{Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use timebank_core::domain::grant::{
    CalculationBasis, Grant, GrantApprovalStatus, GrantId, GrantKind,
};
use timebank_core::domain::job::{JobRun, SubjectOutcome};
use timebank_core::domain::subject::SubjectProfile;

use crate::calendar::{anniversary_window_ending, months_between};
use crate::directory::DateRange;
use crate::runner::{run_job, GrantJobContext, JobError};

pub const MONTHLY_JOB: &str = "monthly_grant";

/// Grants 1.0 day on each hire-day anniversary during the first year of
/// tenure, gated on attendance in the prior anniversary month.
pub struct MonthlyGrantJob {
    ctx: GrantJobContext,
}

impl MonthlyGrantJob {
    pub fn new(ctx: GrantJobContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, today: NaiveDate) -> Result<JobRun, JobError> {
        let ledger = self.ctx.ledger.clone();
        let directory = self.ctx.directory.clone();
        let late_limit = self.ctx.config.monthly_late_limit;

        run_job(&self.ctx, MONTHLY_JOB, today, move |profile| {
            let ledger = ledger.clone();
            let directory = directory.clone();
            async move {
                let subject = profile.id.clone();
                match evaluate(&ledger, directory.as_ref(), late_limit, &profile, today).await {
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
    late_limit: u32,
    profile: &SubjectProfile,
    today: NaiveDate,
) -> Result<SubjectOutcome, String> {
    let subject = profile.id.clone();

    if profile.hire_date.day() != today.day() {
        return Ok(SubjectOutcome::Skipped {
            subject,
            reason: "not the hire anniversary day".to_string(),
        });
    }

    let tenure_months = months_between(profile.hire_date, today);
    if !(1..=12).contains(&tenure_months) {
        return Ok(SubjectOutcome::Skipped {
            subject,
            reason: format!("tenure of {tenure_months} months is outside the first year"),
        });
    }

    let (window_start, window_end) = anniversary_window_ending(today);
    let summary = directory
        .attendance(&profile.id, DateRange { start: window_start, end: window_end })
        .await
        .map_err(|error| error.to_string())?;
    if summary.late_arrivals > late_limit {
        return Ok(SubjectOutcome::Skipped {
            subject,
            reason: format!(
                "attendance gate not met: {} late arrivals (limit {late_limit})",
                summary.late_arrivals
            ),
        });
    }

    let expiration_date = profile
        .hire_date
        .checked_add_months(Months::new(12))
        .ok_or_else(|| format!("hire date {} has no first anniversary", profile.hire_date))?;

    let grant = Grant {
        id: GrantId(format!("GRT-{}", Uuid::new_v4())),
        subject: subject.clone(),
        kind: GrantKind::Monthly,
        amount: Decimal::ONE,
        granted_date: today,
        expiration_date,
        approval_status: GrantApprovalStatus::Approved,
        calculation_basis: CalculationBasis::new("monthly_anniversary")
            .with_input("tenure_months", tenure_months.to_string())
            .with_input("late_arrivals", summary.late_arrivals.to_string())
            .with_input("window_start", window_start.to_string())
            .with_input("window_end", window_end.to_string()),
        created_at: Utc::now(),
    };

    match ledger.record_grant(grant).await {
        Ok(true) => Ok(SubjectOutcome::Granted { subject }),
        Ok(false) => Ok(SubjectOutcome::Skipped {
            subject,
            reason: "monthly grant already issued for this date".to_string(),
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
    use timebank_core::domain::job::SubjectOutcome;
    use timebank_core::domain::subject::{
        AttendanceRecord, EmploymentStatus, SubjectId, SubjectProfile,
    };
    use timebank_db::{InMemoryJobRunStore, InMemoryLedgerStore, LedgerStore};
    use timebank_engine::LedgerService;

    use crate::directory::InMemorySubjectDirectory;
    use crate::runner::GrantJobContext;

    use super::MonthlyGrantJob;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn jobs_config() -> JobsConfig {
        JobsConfig {
            batch_size: 2,
            monthly_late_limit: 2,
            annual_base_days: 15,
            manual_deduction_min_privilege: 3,
        }
    }

    fn profile(id: &str, hire_date: NaiveDate) -> SubjectProfile {
        SubjectProfile {
            id: SubjectId(id.to_string()),
            hire_date,
            status: EmploymentStatus::Active,
        }
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
            config: jobs_config(),
        };
        (ctx, ledger_store)
    }

    #[tokio::test]
    async fn grants_on_the_anniversary_day_within_the_first_year() {
        let today = date(2026, 3, 15);
        let directory = InMemorySubjectDirectory::new(vec![
            profile("emp-anniversary", date(2025, 11, 15)),
            profile("emp-other-day", date(2025, 11, 20)),
            profile("emp-too-old", date(2024, 3, 15)),
        ]);
        let (ctx, ledger_store) = context(directory);

        let run = MonthlyGrantJob::new(ctx).run(today).await.expect("run");
        assert_eq!(run.granted, 1);
        assert_eq!(run.skipped, 2);
        assert_eq!(run.failed, 0);

        let grants = ledger_store
            .grants_for(&SubjectId("emp-anniversary".to_string()))
            .await
            .expect("grants");
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].kind, GrantKind::Monthly);
        assert_eq!(grants[0].amount, Decimal::ONE);
        assert_eq!(grants[0].granted_date, today);
        assert_eq!(grants[0].expiration_date, date(2026, 11, 15));
    }

    #[tokio::test]
    async fn attendance_gate_blocks_subjects_with_too_many_lates() {
        let today = date(2026, 3, 15);
        let subject = SubjectId("emp-late".to_string());
        let late_day = |day| AttendanceRecord { date: date(2026, 3, day), worked: true, late: true };
        let directory =
            InMemorySubjectDirectory::new(vec![profile("emp-late", date(2025, 11, 15))])
                .with_attendance(&subject, vec![late_day(2), late_day(5), late_day(9)]);
        let (ctx, ledger_store) = context(directory);

        let run = MonthlyGrantJob::new(ctx).run(today).await.expect("run");
        assert_eq!(run.granted, 0);
        assert_eq!(run.skipped, 1);
        assert!(ledger_store.grants_for(&subject).await.expect("grants").is_empty());
    }

    #[tokio::test]
    async fn two_lates_stay_within_the_gate() {
        let today = date(2026, 3, 15);
        let subject = SubjectId("emp-ok".to_string());
        let late_day = |day| AttendanceRecord { date: date(2026, 3, day), worked: true, late: true };
        let directory = InMemorySubjectDirectory::new(vec![profile("emp-ok", date(2025, 11, 15))])
            .with_attendance(&subject, vec![late_day(2), late_day(5)]);
        let (ctx, _ledger_store) = context(directory);

        let run = MonthlyGrantJob::new(ctx).run(today).await.expect("run");
        assert_eq!(run.granted, 1);
    }

    #[tokio::test]
    async fn second_run_on_the_same_day_grants_nothing_new() {
        let today = date(2026, 3, 15);
        let directory =
            InMemorySubjectDirectory::new(vec![profile("emp-anniversary", date(2025, 11, 15))]);
        let (ctx, ledger_store) = context(directory);
        let job = MonthlyGrantJob::new(ctx);

        let first = job.run(today).await.expect("first run");
        assert_eq!(first.granted, 1);

        let second = job.run(today).await.expect("second run");
        assert_eq!(second.id, first.id, "replay returns the recorded run");

        let grants = ledger_store
            .grants_for(&SubjectId("emp-anniversary".to_string()))
            .await
            .expect("grants");
        assert_eq!(grants.len(), 1);
    }

    #[tokio::test]
    async fn outcomes_list_names_every_subject() {
        let today = date(2026, 3, 15);
        let directory = InMemorySubjectDirectory::new(vec![
            profile("emp-a", date(2025, 11, 15)),
            profile("emp-b", date(2025, 12, 1)),
        ]);
        let (ctx, _ledger_store) = context(directory);

        let run = MonthlyGrantJob::new(ctx).run(today).await.expect("run");
        assert_eq!(run.outcomes.len(), 2);
        assert!(run
            .outcomes
            .iter()
            .any(|outcome| matches!(outcome, SubjectOutcome::Granted { subject } if subject.0 == "emp-a")));
        assert!(run
            .outcomes
            .iter()
            .any(|outcome| matches!(outcome, SubjectOutcome::Skipped { subject, .. } if subject.0 == "emp-b")));
    }
}
