use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use timebank_core::domain::document::{Document, DocumentId, DocumentKind, DocumentStatus};
use timebank_core::domain::step::{Step, StepId, StepMode, StepStatus};
use timebank_core::domain::subject::SubjectId;

use super::{DocumentStore, RepositoryError};
use crate::DbPool;

pub struct SqlDocumentStore {
    pool: DbPool,
}

impl SqlDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode<T>(value: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    value.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_datetime(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Result<Document, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let subject_id: String = decode(row.try_get("subject_id"))?;
    let kind_str: String = decode(row.try_get("kind"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let current_step: Option<i64> = decode(row.try_get("current_step"))?;
    let amount_str: String = decode(row.try_get("entitlement_amount"))?;
    let created_at_str: String = decode(row.try_get("created_at"))?;
    let approved_at_str: Option<String> = decode(row.try_get("approved_at"))?;

    let kind = DocumentKind::parse(&kind_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown document kind `{kind_str}`")))?;
    let status = DocumentStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown document status `{status_str}`"))
    })?;
    let entitlement_amount: Decimal = amount_str
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("invalid amount `{amount_str}`")))?;
    let current_step = current_step
        .map(|order| {
            u32::try_from(order)
                .map_err(|_| RepositoryError::Decode(format!("invalid step order `{order}`")))
        })
        .transpose()?;
    let approved_at = approved_at_str.as_deref().map(parse_datetime).transpose()?;

    Ok(Document {
        id: DocumentId(id),
        subject: SubjectId(subject_id),
        kind,
        status,
        current_step,
        entitlement_amount,
        created_at: parse_datetime(&created_at_str)?,
        approved_at,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<Step, RepositoryError> {
    let id: String = decode(row.try_get("id"))?;
    let document_id: String = decode(row.try_get("document_id"))?;
    let step_order: i64 = decode(row.try_get("step_order"))?;
    let approver_id: String = decode(row.try_get("approver_id"))?;
    let delegate_id: Option<String> = decode(row.try_get("delegate_id"))?;
    let mode_str: String = decode(row.try_get("mode"))?;
    let status_str: String = decode(row.try_get("status"))?;
    let is_last: bool = decode(row.try_get("is_last"))?;
    let approved_at_str: Option<String> = decode(row.try_get("approved_at"))?;

    let mode = StepMode::parse(&mode_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step mode `{mode_str}`")))?;
    let status = StepStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown step status `{status_str}`")))?;
    let order = u32::try_from(step_order)
        .map_err(|_| RepositoryError::Decode(format!("invalid step order `{step_order}`")))?;
    let approved_at = approved_at_str.as_deref().map(parse_datetime).transpose()?;

    Ok(Step {
        id: StepId(id),
        document_id: DocumentId(document_id),
        order,
        approver: SubjectId(approver_id),
        delegate: delegate_id.map(SubjectId),
        mode,
        status,
        is_last,
        approved_at,
    })
}

const STEP_COLUMNS: &str = "id, document_id, step_order, approver_id, delegate_id, mode, status,
                            is_last, approved_at";

#[async_trait::async_trait]
impl DocumentStore for SqlDocumentStore {
    async fn insert_with_steps(
        &self,
        document: Document,
        steps: Vec<Step>,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO document (id, subject_id, kind, status, current_step,
                                   entitlement_amount, created_at, approved_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id.0)
        .bind(&document.subject.0)
        .bind(document.kind.as_str())
        .bind(document.status.as_str())
        .bind(document.current_step.map(i64::from))
        .bind(document.entitlement_amount.to_string())
        .bind(document.created_at.to_rfc3339())
        .bind(document.approved_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await?;

        for step in &steps {
            sqlx::query(
                "INSERT INTO approval_step (id, document_id, step_order, approver_id,
                                            delegate_id, mode, status, is_last, approved_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&step.id.0)
            .bind(&step.document_id.0)
            .bind(i64::from(step.order))
            .bind(&step.approver.0)
            .bind(step.delegate.as_ref().map(|delegate| delegate.0.as_str()))
            .bind(step.mode.as_str())
            .bind(step.status.as_str())
            .bind(step.is_last)
            .bind(step.approved_at.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, subject_id, kind, status, current_step, entitlement_amount,
                    created_at, approved_at
             FROM document WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_document(r)?)),
            None => Ok(None),
        }
    }

    async fn steps_for(&self, id: &DocumentId) -> Result<Vec<Step>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step
             WHERE document_id = ?
             ORDER BY step_order ASC, id ASC"
        ))
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_step).collect()
    }

    async fn pending_step_for(
        &self,
        id: &DocumentId,
        actor: &SubjectId,
    ) -> Result<Option<Step>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {STEP_COLUMNS} FROM approval_step
             WHERE document_id = ? AND status = 'pending'
               AND (approver_id = ? OR delegate_id = ?)
             ORDER BY step_order ASC
             LIMIT 1"
        ))
        .bind(&id.0)
        .bind(&actor.0)
        .bind(&actor.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_step(r)?)),
            None => Ok(None),
        }
    }

    async fn approve_step(
        &self,
        id: &StepId,
        approved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_step
             SET status = 'approved', approved_at = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(approved_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reject_step(&self, id: &StepId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_step SET status = 'rejected' WHERE id = ? AND status = 'pending'",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_delegate(
        &self,
        id: &StepId,
        delegate: &SubjectId,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE approval_step SET delegate_id = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(&delegate.0)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn advance_document(
        &self,
        id: &DocumentId,
        from_order: u32,
        to_order: u32,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let moved = sqlx::query(
            "UPDATE document
             SET current_step = ?
             WHERE id = ? AND status = 'pending' AND current_step = ?",
        )
        .bind(i64::from(to_order))
        .bind(&id.0)
        .bind(i64::from(from_order))
        .execute(&mut *tx)
        .await?;

        if moved.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE approval_step
             SET status = 'pending'
             WHERE document_id = ? AND step_order = ? AND status = 'waiting'",
        )
        .bind(&id.0)
        .bind(i64::from(to_order))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn complete_document(
        &self,
        id: &DocumentId,
        from_order: u32,
        approved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE document
             SET status = 'approved', current_step = NULL, approved_at = ?
             WHERE id = ? AND status = 'pending' AND current_step = ?",
        )
        .bind(approved_at.to_rfc3339())
        .bind(&id.0)
        .bind(i64::from(from_order))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reject_document(&self, id: &DocumentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE document
             SET status = 'rejected', current_step = NULL
             WHERE id = ? AND status = 'pending'",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel_document(&self, id: &DocumentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE document
             SET status = 'cancelled', current_step = NULL
             WHERE id = ? AND status = 'pending'",
        )
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
