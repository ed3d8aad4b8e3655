use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::error;

use timebank_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use timebank_core::domain::document::DocumentId;
use timebank_core::domain::subject::SubjectId;

use super::RepositoryError;
use crate::DbPool;

/// Durable audit trail. `AuditSink::emit` is fire-and-forget by contract,
/// so the write happens on a spawned task and a failure is logged rather
/// than surfaced to the transition that produced the event.
#[derive(Clone)]
pub struct SqlAuditLog {
    pool: DbPool,
}

impl SqlAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: AuditEvent) -> Result<(), RepositoryError> {
        let metadata_json = serde_json::to_string(&event.metadata)
            .map_err(|e| RepositoryError::Decode(format!("metadata encode: {e}")))?;

        sqlx::query(
            "INSERT INTO audit_event (event_id, document_id, subject_id, correlation_id,
                                      event_type, category, actor, outcome, metadata_json,
                                      occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(event.document_id.as_ref().map(|id| id.0.as_str()))
        .bind(event.subject_id.as_ref().map(|id| id.0.as_str()))
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(event.category.as_str())
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(metadata_json)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn events_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, document_id, subject_id, correlation_id, event_type,
                    category, actor, outcome, metadata_json, occurred_at
             FROM audit_event
             WHERE document_id = ?
             ORDER BY occurred_at ASC, event_id ASC",
        )
        .bind(&document_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

impl AuditSink for SqlAuditLog {
    fn emit(&self, event: AuditEvent) {
        let log = self.clone();
        tokio::spawn(async move {
            if let Err(err) = log.append(event).await {
                error!(
                    event_name = "audit.append_failed",
                    error = %err,
                    "failed to persist audit event"
                );
            }
        });
    }
}

fn decode<T>(value: Result<T, sqlx::Error>) -> Result<T, RepositoryError> {
    value.map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let event_id: String = decode(row.try_get("event_id"))?;
    let document_id: Option<String> = decode(row.try_get("document_id"))?;
    let subject_id: Option<String> = decode(row.try_get("subject_id"))?;
    let correlation_id: String = decode(row.try_get("correlation_id"))?;
    let event_type: String = decode(row.try_get("event_type"))?;
    let category_str: String = decode(row.try_get("category"))?;
    let actor: String = decode(row.try_get("actor"))?;
    let outcome_str: String = decode(row.try_get("outcome"))?;
    let metadata_json: String = decode(row.try_get("metadata_json"))?;
    let occurred_at_str: String = decode(row.try_get("occurred_at"))?;

    let category = AuditCategory::parse(&category_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown audit category `{category_str}`"))
    })?;
    let outcome = AuditOutcome::parse(&outcome_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown audit outcome `{outcome_str}`")))?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|e| RepositoryError::Decode(format!("invalid metadata payload: {e}")))?;
    let occurred_at = DateTime::parse_from_rfc3339(&occurred_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp: {e}")))?;

    let mut event = AuditEvent::new(
        document_id.map(DocumentId),
        subject_id.map(SubjectId),
        correlation_id,
        event_type,
        category,
        actor,
        outcome,
    );
    event.event_id = event_id;
    event.metadata = metadata;
    event.occurred_at = occurred_at;
    Ok(event)
}
