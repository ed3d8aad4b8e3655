use std::future::Future;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use timebank_core::config::JobsConfig;
use timebank_core::domain::job::{JobRun, JobRunId, SubjectOutcome};
use timebank_core::domain::subject::SubjectProfile;
use timebank_db::{JobRunStore, RepositoryError};
use timebank_engine::LedgerService;

use crate::directory::SubjectDirectory;

#[derive(Clone, Debug, Error)]
pub enum JobError {
    /// Job-level failure: the subject list itself could not be read.
    /// Everything downstream is isolated per subject instead.
    #[error("could not read subject list: {0}")]
    SubjectListUnavailable(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl From<RepositoryError> for JobError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// Everything a grant job needs: the ledger to post into, the directory to
/// read, the run store for the `(job_name, business_date)` guard, and the
/// batch configuration.
#[derive(Clone)]
pub struct GrantJobContext {
    pub ledger: LedgerService,
    pub directory: Arc<dyn SubjectDirectory>,
    pub runs: Arc<dyn JobRunStore>,
    pub config: JobsConfig,
}

/// Shared frame for all grant jobs: replay guard, bounded parallel batches,
/// per-subject failure isolation, and a single persisted summary record.
pub(crate) async fn run_job<F, Fut>(
    ctx: &GrantJobContext,
    job_name: &str,
    business_date: NaiveDate,
    evaluate: F,
) -> Result<JobRun, JobError>
where
    F: Fn(SubjectProfile) -> Fut,
    Fut: Future<Output = SubjectOutcome> + Send + 'static,
{
    if let Some(existing) = ctx.runs.find_run(job_name, business_date).await? {
        info!(
            event_name = "job.run_replayed",
            job_name,
            business_date = %business_date,
            "run already recorded for business date, returning stored summary"
        );
        return Ok(existing);
    }

    let started_at = Utc::now();
    let subjects = ctx
        .directory
        .list_active()
        .await
        .map_err(|error| JobError::SubjectListUnavailable(error.to_string()))?;

    let batch_size = ctx.config.batch_size.max(1) as usize;
    let mut outcomes: Vec<SubjectOutcome> = Vec::with_capacity(subjects.len());

    for batch in subjects.chunks(batch_size) {
        let mut handles = Vec::with_capacity(batch.len());
        for profile in batch.iter().cloned() {
            let subject = profile.id.clone();
            handles.push((subject, tokio::spawn(evaluate(profile))));
        }

        for (subject, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_error) => SubjectOutcome::Failed {
                    subject,
                    reason: format!("evaluation task aborted: {join_error}"),
                },
            };
            outcomes.push(outcome);
        }
    }

    let (granted, skipped, failed) = JobRun::tally(&outcomes);
    let run = JobRun {
        id: JobRunId(format!("RUN-{}", Uuid::new_v4())),
        job_name: job_name.to_string(),
        business_date,
        granted,
        skipped,
        failed,
        outcomes,
        started_at,
        finished_at: Utc::now(),
    };

    if !ctx.runs.insert_run(run.clone()).await? {
        // An overlapping invocation recorded its summary first; the grant
        // issue keys already made both passes idempotent.
        if let Some(existing) = ctx.runs.find_run(job_name, business_date).await? {
            return Ok(existing);
        }
    }

    info!(
        event_name = "job.run_completed",
        job_name,
        business_date = %business_date,
        granted,
        skipped,
        failed,
        "grant job finished"
    );

    Ok(run)
}
