use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use timebank_core::domain::grant::{
    CalculationBasis, Grant, GrantApprovalStatus, GrantId, GrantKind,
};
use timebank_core::domain::job::{JobRun, SubjectOutcome};
use timebank_core::domain::subject::SubjectProfile;

use crate::calendar::{fiscal_year_end, fiscal_year_start};
use crate::runner::{run_job, GrantJobContext, JobError};

pub const ANNUAL_JOB: &str = "fiscal_annual_grant";

/// Once per calendar year, grants `floor(prior-year-days-employed / 365 ×
/// base)` days to everyone hired before the fiscal year started.
pub struct FiscalAnnualGrantJob {
    ctx: GrantJobContext,
}

impl FiscalAnnualGrantJob {
    pub fn new(ctx: GrantJobContext) -> Self {
        Self { ctx }
    }

    pub async fn run(&self, today: NaiveDate) -> Result<JobRun, JobError> {
        let fiscal_start = fiscal_year_start(today);
        let fiscal_end = fiscal_year_end(today);
        let ledger = self.ctx.ledger.clone();
        let base_days = self.ctx.config.annual_base_days;

        run_job(&self.ctx, ANNUAL_JOB, fiscal_start, move |profile| {
            let ledger = ledger.clone();
            async move {
                let subject = profile.id.clone();
                match evaluate(&ledger, base_days, &profile, fiscal_start, fiscal_end).await {
                    Ok(outcome) => outcome,
                    Err(reason) => SubjectOutcome::Failed { subject, reason },
                }
            }
        })
        .await
    }
}

/// Whole days of entitlement from prior-year proration; the fraction is
/// dropped, never rounded up.
fn prorated_days(days_employed: i64, base_days: u32) -> i64 {
    days_employed * i64::from(base_days) / 365
}

async fn evaluate(
    ledger: &timebank_engine::LedgerService,
    base_days: u32,
    profile: &SubjectProfile,
    fiscal_start: NaiveDate,
    fiscal_end: NaiveDate,
) -> Result<SubjectOutcome, String> {
    let subject = profile.id.clone();

    if profile.hire_date >= fiscal_start {
        return Ok(SubjectOutcome::Skipped {
            subject,
            reason: "hired in the current fiscal year".to_string(),
        });
    }

    let prior_year_start = NaiveDate::from_ymd_opt(fiscal_start.year() - 1, 1, 1)
        .ok_or_else(|| "prior fiscal year start out of range".to_string())?;
    let prior_year_end =
        fiscal_start.pred_opt().ok_or_else(|| "prior fiscal year end out of range".to_string())?;

    let employed_from = profile.hire_date.max(prior_year_start);
    let days_employed = (prior_year_end - employed_from).num_days() + 1;
    let amount_days = prorated_days(days_employed, base_days);
    if amount_days == 0 {
        return Ok(SubjectOutcome::Skipped {
            subject,
            reason: format!("{days_employed} prior-year days prorate to zero entitlement"),
        });
    }

    let grant = Grant {
        id: GrantId(format!("GRT-{}", Uuid::new_v4())),
        subject: subject.clone(),
        kind: GrantKind::FiscalAnnual,
        amount: Decimal::new(amount_days, 0),
        granted_date: fiscal_start,
        expiration_date: fiscal_end,
        approval_status: GrantApprovalStatus::Approved,
        calculation_basis: CalculationBasis::new("fiscal_annual_proration")
            .with_input("days_employed", days_employed.to_string())
            .with_input("base_days", base_days.to_string())
            .with_input("prior_year", prior_year_start.year().to_string()),
        created_at: Utc::now(),
    };

    match ledger.record_grant(grant).await {
        Ok(true) => Ok(SubjectOutcome::Granted { subject }),
        Ok(false) => Ok(SubjectOutcome::Skipped {
            subject,
            reason: "annual grant already issued for this fiscal year".to_string(),
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
    use timebank_core::domain::subject::{EmploymentStatus, SubjectId, SubjectProfile};
    use timebank_db::{InMemoryJobRunStore, InMemoryLedgerStore, LedgerStore};
    use timebank_engine::LedgerService;

    use crate::directory::InMemorySubjectDirectory;
    use crate::runner::GrantJobContext;

    use super::{prorated_days, FiscalAnnualGrantJob};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
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
            config: JobsConfig {
                batch_size: 10,
                monthly_late_limit: 2,
                annual_base_days: 15,
                manual_deduction_min_privilege: 3,
            },
        };
        (ctx, ledger_store)
    }

    #[test]
    fn proration_floors_the_fraction() {
        assert_eq!(prorated_days(365, 15), 15);
        assert_eq!(prorated_days(200, 15), 8);
        assert_eq!(prorated_days(24, 15), 0);
        assert_eq!(prorated_days(183, 15), 7);
    }

    #[tokio::test]
    async fn full_prior_year_earns_the_full_base() {
        let directory =
            InMemorySubjectDirectory::new(vec![profile("emp-veteran", date(2023, 4, 1))]);
        let (ctx, ledger_store) = context(directory);

        let run = FiscalAnnualGrantJob::new(ctx).run(date(2026, 1, 1)).await.expect("run");
        assert_eq!(run.granted, 1);
        assert_eq!(run.business_date, date(2026, 1, 1));

        let grants = ledger_store
            .grants_for(&SubjectId("emp-veteran".to_string()))
            .await
            .expect("grants");
        assert_eq!(grants[0].amount, Decimal::new(15, 0));
        assert_eq!(grants[0].granted_date, date(2026, 1, 1));
        assert_eq!(grants[0].expiration_date, date(2026, 12, 31));
    }

    #[tokio::test]
    async fn partial_prior_year_is_prorated_down() {
        let directory =
            InMemorySubjectDirectory::new(vec![profile("emp-june", date(2025, 6, 15))]);
        let (ctx, ledger_store) = context(directory);

        let run = FiscalAnnualGrantJob::new(ctx).run(date(2026, 1, 1)).await.expect("run");
        assert_eq!(run.granted, 1);

        // 2025-06-15..=2025-12-31 is 200 days; floor(200 / 365 * 15) = 8.
        let grants =
            ledger_store.grants_for(&SubjectId("emp-june".to_string())).await.expect("grants");
        assert_eq!(grants[0].amount, Decimal::new(8, 0));
        assert_eq!(
            grants[0].calculation_basis.inputs.get("days_employed").map(String::as_str),
            Some("200")
        );
    }

    #[tokio::test]
    async fn current_year_hires_and_zero_prorations_are_skipped() {
        let directory = InMemorySubjectDirectory::new(vec![
            profile("emp-new", date(2026, 1, 1)),
            profile("emp-late-december", date(2025, 12, 20)),
        ]);
        let (ctx, ledger_store) = context(directory);

        let run = FiscalAnnualGrantJob::new(ctx).run(date(2026, 1, 1)).await.expect("run");
        assert_eq!(run.granted, 0);
        assert_eq!(run.skipped, 2);

        assert!(ledger_store
            .grants_for(&SubjectId("emp-late-december".to_string()))
            .await
            .expect("grants")
            .is_empty());
    }

    #[tokio::test]
    async fn rerun_within_the_year_reuses_the_recorded_run() {
        let directory =
            InMemorySubjectDirectory::new(vec![profile("emp-veteran", date(2023, 4, 1))]);
        let (ctx, ledger_store) = context(directory);
        let job = FiscalAnnualGrantJob::new(ctx);

        let first = job.run(date(2026, 1, 1)).await.expect("first");
        // A later trigger inside the same year maps to the same fiscal start.
        let second = job.run(date(2026, 1, 2)).await.expect("second");
        assert_eq!(second.id, first.id);

        let grants = ledger_store
            .grants_for(&SubjectId("emp-veteran".to_string()))
            .await
            .expect("grants");
        assert_eq!(grants.len(), 1);
    }
}
