use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use timebank_core::domain::job::{JobRun, JobRunId, SubjectOutcome};

use super::{JobRunStore, RepositoryError};
use crate::DbPool;

pub struct SqlJobRunStore {
    pool: DbPool,
}

impl SqlJobRunStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(value: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    value.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_count(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Decode(format!("invalid count `{value}`")))
}

fn row_to_run(row: &sqlx::sqlite::SqliteRow) -> Result<JobRun, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let job_name: String = decode(row.try_get("job_name"))?;
    let business_date_str: String = decode(row.try_get("business_date"))?;
    let granted: i64 = decode(row.try_get("granted"))?;
    let skipped: i64 = decode(row.try_get("skipped"))?;
    let failed: i64 = decode(row.try_get("failed"))?;
    let outcomes_json: String = decode(row.try_get("outcomes_json"))?;
    let started_at_str: String = decode(row.try_get("started_at"))?;
    let finished_at_str: String = decode(row.try_get("finished_at"))?;

    let business_date: NaiveDate = business_date_str
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("invalid date `{business_date_str}`")))?;
    let outcomes: Vec<SubjectOutcome> = serde_json::from_str(&outcomes_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid outcomes payload: {e}")))?;

    let parse_ts = |raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
    };

    Ok(JobRun {
        id: JobRunId(id),
        job_name,
        business_date,
        granted: parse_count(granted)?,
        skipped: parse_count(skipped)?,
        failed: parse_count(failed)?,
        outcomes,
        started_at: parse_ts(&started_at_str)?,
        finished_at: parse_ts(&finished_at_str)?,
    })
}

#[async_trait::async_trait]
impl JobRunStore for SqlJobRunStore {
    async fn find_run(
        &self,
        job_name: &str,
        business_date: NaiveDate,
    ) -> Result<Option<JobRun>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, job_name, business_date, granted, skipped, failed,
                    outcomes_json, started_at, finished_at
             FROM job_run WHERE job_name = ? AND business_date = ?",
        )
        .bind(job_name)
        .bind(business_date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_run(r)?)),
            None => Ok(None),
        }
    }

    async fn insert_run(&self, run: JobRun) -> Result<bool, RepositoryError> {
        let outcomes_json = serde_json::to_string(&run.outcomes)
            .map_err(|e| RepositoryError::Decode(format!("outcomes encode: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO job_run (id, job_name, business_date, granted, skipped, failed,
                                  outcomes_json, started_at, finished_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(job_name, business_date) DO NOTHING",
        )
        .bind(&run.id.0)
        .bind(&run.job_name)
        .bind(run.business_date.to_string())
        .bind(i64::from(run.granted))
        .bind(i64::from(run.skipped))
        .bind(i64::from(run.failed))
        .bind(outcomes_json)
        .bind(run.started_at.to_rfc3339())
        .bind(run.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use timebank_core::domain::job::{JobRun, JobRunId, SubjectOutcome};
    use timebank_core::domain::subject::SubjectId;

    use super::SqlJobRunStore;
    use crate::repositories::JobRunStore;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_run(id: &str, job_name: &str, business_date: NaiveDate) -> JobRun {
        let now = Utc::now();
        JobRun {
            id: JobRunId(id.to_string()),
            job_name: job_name.to_string(),
            business_date,
            granted: 2,
            skipped: 1,
            failed: 0,
            outcomes: vec![
                SubjectOutcome::Granted { subject: SubjectId("emp-1".to_string()) },
                SubjectOutcome::Granted { subject: SubjectId("emp-2".to_string()) },
                SubjectOutcome::Skipped {
                    subject: SubjectId("emp-3".to_string()),
                    reason: "already granted".to_string(),
                },
            ],
            started_at: now,
            finished_at: now,
        }
    }

    #[tokio::test]
    async fn run_round_trips_with_outcomes() {
        let pool = setup().await;
        let store = SqlJobRunStore::new(pool);
        let business_date = NaiveDate::from_ymd_opt(2026, 3, 15).expect("valid date");

        let run = sample_run("RUN-1", "monthly_grant", business_date);
        assert!(store.insert_run(run).await.expect("insert"));

        let found = store
            .find_run("monthly_grant", business_date)
            .await
            .expect("find")
            .expect("should exist");
        assert_eq!(found.granted, 2);
        assert_eq!(found.outcomes.len(), 3);
    }

    #[tokio::test]
    async fn duplicate_business_date_is_rejected() {
        let pool = setup().await;
        let store = SqlJobRunStore::new(pool);
        let business_date = NaiveDate::from_ymd_opt(2026, 3, 15).expect("valid date");

        assert!(store
            .insert_run(sample_run("RUN-1", "monthly_grant", business_date))
            .await
            .expect("first insert"));
        assert!(!store
            .insert_run(sample_run("RUN-2", "monthly_grant", business_date))
            .await
            .expect("duplicate insert"));

        // A different job may share the business date.
        assert!(store
            .insert_run(sample_run("RUN-3", "attendance_award", business_date))
            .await
            .expect("other job insert"));
    }
}
