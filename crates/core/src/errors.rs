use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::document::{DocumentId, DocumentStatus};
use crate::domain::subject::SubjectId;

/// Failures of the step state machine. `NoPendingStep` and `NotRequester`
/// are authorization failures; `PreconditionFailed` is the concurrent-
/// transition defense (the conditional update matched no row, so the
/// caller must re-fetch and re-decide). None of these leave partial state.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no pending approval step for actor `{actor}` on document `{document_id}`")]
    NoPendingStep { document_id: String, actor: String },
    #[error("actor `{actor}` is not the requester of document `{document_id}`")]
    NotRequester { document_id: String, actor: String },
    #[error("document `{document_id}` changed concurrently: {detail}")]
    PreconditionFailed { document_id: String, detail: String },
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
}

impl WorkflowError {
    pub fn no_pending_step(document_id: &DocumentId, actor: &SubjectId) -> Self {
        Self::NoPendingStep { document_id: document_id.0.clone(), actor: actor.0.clone() }
    }

    pub fn not_requester(document_id: &DocumentId, actor: &SubjectId) -> Self {
        Self::NotRequester { document_id: document_id.0.clone(), actor: actor.0.clone() }
    }

    pub fn precondition_failed(document_id: &DocumentId, detail: impl Into<String>) -> Self {
        Self::PreconditionFailed { document_id: document_id.0.clone(), detail: detail.into() }
    }

    /// True for the variants the caller can repair by refreshing state;
    /// false for plain authorization failures.
    pub fn is_retryable_after_refresh(&self) -> bool {
        matches!(self, Self::PreconditionFailed { .. })
    }
}

/// Failures of the leave ledger. An insufficient balance commits nothing;
/// a repeated deduction for an already-posted document is not an error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Decimal, available: Decimal },
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Decimal, reason: String },
    #[error("ledger data integrity violation: {0}")]
    DataIntegrity(String),
}

/// Invalid persisted state discovered during a transition, fatal for the
/// current unit of work only.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("data integrity violation for document `{document_id}` in status {status:?}: {detail}")]
pub struct DocumentIntegrityError {
    pub document_id: String,
    pub status: DocumentStatus,
    pub detail: String,
}
