use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use timebank_core::domain::balance::Balance;
use timebank_core::domain::document::{Document, DocumentId};
use timebank_core::domain::grant::Grant;
use timebank_core::domain::job::JobRun;
use timebank_core::domain::step::{Step, StepId};
use timebank_core::domain::subject::SubjectId;
use timebank_core::domain::usage::Usage;

pub mod audit_log;
pub mod document;
pub mod job_run;
pub mod ledger;
pub mod memory;

pub use audit_log::SqlAuditLog;
pub use document::SqlDocumentStore;
pub use job_run::SqlJobRunStore;
pub use ledger::SqlLedgerStore;
pub use memory::{InMemoryDocumentStore, InMemoryJobRunStore, InMemoryLedgerStore};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Documents and their approval steps. Every mutating method is a
/// conditional update over the expected prior status; `Ok(false)` means no
/// row matched, which the engine surfaces as `PreconditionFailed`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_with_steps(
        &self,
        document: Document,
        steps: Vec<Step>,
    ) -> Result<(), RepositoryError>;

    async fn find_document(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;

    async fn steps_for(&self, id: &DocumentId) -> Result<Vec<Step>, RepositoryError>;

    /// The actor's pending step on this document, matched against the
    /// approver of record or the delegate.
    async fn pending_step_for(
        &self,
        id: &DocumentId,
        actor: &SubjectId,
    ) -> Result<Option<Step>, RepositoryError>;

    async fn approve_step(
        &self,
        id: &StepId,
        approved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn reject_step(&self, id: &StepId) -> Result<bool, RepositoryError>;

    async fn set_delegate(
        &self,
        id: &StepId,
        delegate: &SubjectId,
    ) -> Result<bool, RepositoryError>;

    /// Moves a pending document from one order to the next and activates
    /// the waiting steps there, atomically.
    async fn advance_document(
        &self,
        id: &DocumentId,
        from_order: u32,
        to_order: u32,
    ) -> Result<bool, RepositoryError>;

    async fn complete_document(
        &self,
        id: &DocumentId,
        from_order: u32,
        approved_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn reject_document(&self, id: &DocumentId) -> Result<bool, RepositoryError>;

    async fn cancel_document(&self, id: &DocumentId) -> Result<bool, RepositoryError>;
}

/// Grants, usage postings, and the derived balance cache. Grants and
/// usages are append-only; contention is resolved by the unique keys, not
/// by locks.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Inserts unless a grant with the same `(subject, kind, granted_date)`
    /// issue key already exists. `Ok(false)` reports the idempotent skip.
    async fn insert_grant_if_absent(&self, grant: Grant) -> Result<bool, RepositoryError>;

    async fn grants_for(&self, subject: &SubjectId) -> Result<Vec<Grant>, RepositoryError>;

    async fn usages_for_subject(&self, subject: &SubjectId) -> Result<Vec<Usage>, RepositoryError>;

    async fn usages_for_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Vec<Usage>, RepositoryError>;

    /// Writes a full usage set and the recomputed balance in one
    /// transaction; a shortfall discovered earlier never reaches here.
    async fn post_usages(&self, usages: Vec<Usage>, balance: Balance)
        -> Result<(), RepositoryError>;

    async fn save_balance(&self, balance: Balance) -> Result<(), RepositoryError>;

    async fn find_balance(&self, subject: &SubjectId) -> Result<Option<Balance>, RepositoryError>;
}

/// Batch-job run records keyed `(job_name, business_date)`.
#[async_trait]
pub trait JobRunStore: Send + Sync {
    async fn find_run(
        &self,
        job_name: &str,
        business_date: NaiveDate,
    ) -> Result<Option<JobRun>, RepositoryError>;

    /// `Ok(false)` when a run for the same key was recorded concurrently.
    async fn insert_run(&self, run: JobRun) -> Result<bool, RepositoryError>;
}
