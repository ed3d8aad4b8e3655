use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::subject::SubjectId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRunId(pub String);

/// Per-subject result of one batch-job evaluation. Failures are isolated
/// to the subject; they never abort the rest of the batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubjectOutcome {
    Granted { subject: SubjectId },
    Skipped { subject: SubjectId, reason: String },
    Failed { subject: SubjectId, reason: String },
}

impl SubjectOutcome {
    pub fn subject(&self) -> &SubjectId {
        match self {
            Self::Granted { subject }
            | Self::Skipped { subject, .. }
            | Self::Failed { subject, .. } => subject,
        }
    }
}

/// Persisted summary of one batch-job run, keyed `(job_name, business_date)`.
/// The key is the job-level idempotency guard: a re-run for the same
/// business date returns this record instead of re-processing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRun {
    pub id: JobRunId,
    pub job_name: String,
    pub business_date: NaiveDate,
    pub granted: u32,
    pub skipped: u32,
    pub failed: u32,
    pub outcomes: Vec<SubjectOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobRun {
    pub fn tally(outcomes: &[SubjectOutcome]) -> (u32, u32, u32) {
        let mut granted = 0;
        let mut skipped = 0;
        let mut failed = 0;
        for outcome in outcomes {
            match outcome {
                SubjectOutcome::Granted { .. } => granted += 1,
                SubjectOutcome::Skipped { .. } => skipped += 1,
                SubjectOutcome::Failed { .. } => failed += 1,
            }
        }
        (granted, skipped, failed)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::subject::SubjectId;

    use super::{JobRun, SubjectOutcome};

    #[test]
    fn tally_counts_each_outcome_class() {
        let outcomes = vec![
            SubjectOutcome::Granted { subject: SubjectId("a".to_string()) },
            SubjectOutcome::Skipped {
                subject: SubjectId("b".to_string()),
                reason: "already granted".to_string(),
            },
            SubjectOutcome::Granted { subject: SubjectId("c".to_string()) },
            SubjectOutcome::Failed {
                subject: SubjectId("d".to_string()),
                reason: "missing hire date".to_string(),
            },
        ];

        assert_eq!(JobRun::tally(&outcomes), (2, 1, 1));
    }
}
