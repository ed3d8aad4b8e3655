use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use timebank_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use timebank_core::domain::balance::Balance;
use timebank_core::domain::document::DocumentId;
use timebank_core::domain::grant::Grant;
use timebank_core::domain::subject::SubjectId;
use timebank_core::domain::usage::{Usage, UsageId};
use timebank_core::ledger;
use timebank_db::LedgerStore;

use crate::errors::EngineError;

/// Outcome of a deduction request. A repeated call for an already-posted
/// document is a success, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeductionReceipt {
    Posted { postings: usize },
    AlreadyPosted,
}

/// Expiration-aware accounting over one subject's grants and usages.
/// Correctness under concurrent calls rests on the store's unique keys,
/// not on in-process locking.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Read-only balance snapshot; never writes the cache.
    pub async fn available_balance(
        &self,
        subject: &SubjectId,
        as_of: NaiveDate,
    ) -> Result<Balance, EngineError> {
        let grants = self.store.grants_for(subject).await?;
        let usages = self.store.usages_for_subject(subject).await?;
        Ok(ledger::snapshot(subject, &grants, &usages, as_of, Utc::now()))
    }

    /// The cached row, falling back to a fresh snapshot when the cache was
    /// never primed.
    pub async fn cached_balance(
        &self,
        subject: &SubjectId,
        as_of: NaiveDate,
    ) -> Result<Balance, EngineError> {
        match self.store.find_balance(subject).await? {
            Some(balance) => Ok(balance),
            None => self.available_balance(subject, as_of).await,
        }
    }

    /// FIFO deduction for an approved document. The document id is the
    /// idempotency key; a retried call posts nothing and reports
    /// `AlreadyPosted`.
    pub async fn deduct(
        &self,
        document_id: &DocumentId,
        subject: &SubjectId,
        amount: Decimal,
        used_date: NaiveDate,
    ) -> Result<DeductionReceipt, EngineError> {
        if !self.store.usages_for_document(document_id).await?.is_empty() {
            info!(
                event_name = "ledger.deduction_replayed",
                document_id = %document_id.0,
                subject_id = %subject.0,
                "usage already posted for document, skipping"
            );
            return Ok(DeductionReceipt::AlreadyPosted);
        }

        self.post_deduction(document_id, subject, amount, used_date, "approval-engine").await
    }

    /// Administrative deduction with a synthetic document id. The privilege
    /// check happens at the caller boundary; this only posts.
    pub async fn deduct_manual(
        &self,
        subject: &SubjectId,
        amount: Decimal,
        reason: &str,
        actor: &SubjectId,
    ) -> Result<DeductionReceipt, EngineError> {
        let document_id = Usage::synthetic_document_id();
        let receipt = self
            .post_deduction(&document_id, subject, amount, Utc::now().date_naive(), &actor.0)
            .await?;

        self.audit.emit(
            AuditEvent::new(
                Some(document_id),
                Some(subject.clone()),
                Uuid::new_v4().to_string(),
                "ledger.manual_deduction",
                AuditCategory::Ledger,
                actor.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("amount", amount.to_string())
            .with_metadata("reason", reason),
        );

        Ok(receipt)
    }

    /// Records a grant unless its `(subject, kind, granted_date)` issue key
    /// already exists, then refreshes the balance cache.
    pub async fn record_grant(&self, grant: Grant) -> Result<bool, EngineError> {
        grant.validate()?;

        let subject = grant.subject.clone();
        let kind = grant.kind;
        let granted_date = grant.granted_date;
        let amount = grant.amount;

        let inserted = self.store.insert_grant_if_absent(grant).await?;
        if !inserted {
            info!(
                event_name = "ledger.grant_replayed",
                subject_id = %subject.0,
                kind = kind.as_str(),
                granted_date = %granted_date,
                "grant already issued for key, skipping"
            );
            return Ok(false);
        }

        let balance = self.available_balance(&subject, granted_date).await?;
        self.store.save_balance(balance).await?;

        self.audit.emit(
            AuditEvent::new(
                None,
                Some(subject),
                Uuid::new_v4().to_string(),
                "ledger.grant_recorded",
                AuditCategory::Ledger,
                "grant-issuer",
                AuditOutcome::Success,
            )
            .with_metadata("kind", kind.as_str())
            .with_metadata("amount", amount.to_string())
            .with_metadata("granted_date", granted_date.to_string()),
        );

        Ok(true)
    }

    async fn post_deduction(
        &self,
        document_id: &DocumentId,
        subject: &SubjectId,
        amount: Decimal,
        used_date: NaiveDate,
        actor: &str,
    ) -> Result<DeductionReceipt, EngineError> {
        let grants = self.store.grants_for(subject).await?;
        let usages = self.store.usages_for_subject(subject).await?;

        let plan = match ledger::plan_deduction(&grants, &usages, amount, used_date) {
            Ok(plan) => plan,
            Err(error) => {
                warn!(
                    event_name = "ledger.deduction_rejected",
                    document_id = %document_id.0,
                    subject_id = %subject.0,
                    error = %error,
                    "deduction could not be planned, nothing posted"
                );
                return Err(error.into());
            }
        };

        let now = Utc::now();
        let postings: Vec<Usage> = plan
            .into_iter()
            .map(|posting| Usage {
                id: UsageId(format!("USG-{}", Uuid::new_v4())),
                document_id: document_id.clone(),
                grant_id: posting.grant_id,
                amount: posting.amount,
                used_date,
                created_at: now,
            })
            .collect();

        let mut all_usages = usages;
        all_usages.extend(postings.iter().cloned());
        let balance = ledger::snapshot(subject, &grants, &all_usages, used_date, now);

        let posting_count = postings.len();
        self.store.post_usages(postings, balance).await?;

        info!(
            event_name = "ledger.usage_posted",
            document_id = %document_id.0,
            subject_id = %subject.0,
            amount = %amount,
            postings = posting_count,
            "deduction posted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(document_id.clone()),
                Some(subject.clone()),
                Uuid::new_v4().to_string(),
                "ledger.usage_posted",
                AuditCategory::Ledger,
                actor.to_string(),
                AuditOutcome::Success,
            )
            .with_metadata("amount", amount.to_string())
            .with_metadata("postings", posting_count.to_string()),
        );

        Ok(DeductionReceipt::Posted { postings: posting_count })
    }
}
