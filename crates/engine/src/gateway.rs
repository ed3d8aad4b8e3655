use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;

use timebank_core::domain::balance::Balance;
use timebank_core::domain::document::{DocumentId, DocumentStatus};
use timebank_core::domain::subject::SubjectId;

use crate::approval::{ApprovalEngine, ApprovalOutcome, SubmitRequest};
use crate::errors::EngineError;
use crate::ledger::LedgerService;

/// What collaborators see of a document on every query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DocumentView {
    pub id: DocumentId,
    pub status: DocumentStatus,
    pub current_step: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ManualDeductionRequest {
    pub subject: SubjectId,
    pub amount: Decimal,
    pub reason: String,
    pub actor: SubjectId,
    pub actor_privilege: u8,
}

/// Thin external-facing facade over the approval engine and the ledger.
/// The privilege floor for manual deductions is enforced here, at the
/// caller boundary, so the ledger itself stays policy-free.
#[derive(Clone)]
pub struct DocumentGateway {
    engine: ApprovalEngine,
    ledger: LedgerService,
    manual_deduction_min_privilege: u8,
}

impl DocumentGateway {
    pub fn new(
        engine: ApprovalEngine,
        ledger: LedgerService,
        manual_deduction_min_privilege: u8,
    ) -> Self {
        Self { engine, ledger, manual_deduction_min_privilege }
    }

    pub async fn submit(&self, request: SubmitRequest) -> Result<DocumentView, EngineError> {
        let document = self.engine.submit(request).await?;
        Ok(DocumentView {
            id: document.id,
            status: document.status,
            current_step: document.current_step,
        })
    }

    pub async fn document(&self, document_id: &DocumentId) -> Result<DocumentView, EngineError> {
        let document = self.engine.document(document_id).await?;
        Ok(DocumentView {
            id: document.id,
            status: document.status,
            current_step: document.current_step,
        })
    }

    pub async fn approve(
        &self,
        document_id: &DocumentId,
        approver: &SubjectId,
    ) -> Result<ApprovalOutcome, EngineError> {
        self.engine.approve(document_id, approver).await
    }

    pub async fn reject(
        &self,
        document_id: &DocumentId,
        approver: &SubjectId,
        reason: &str,
    ) -> Result<DocumentStatus, EngineError> {
        self.engine.reject(document_id, approver, reason).await
    }

    pub async fn delegate(
        &self,
        document_id: &DocumentId,
        approver: &SubjectId,
        delegate: &SubjectId,
    ) -> Result<(), EngineError> {
        self.engine.delegate(document_id, approver, delegate).await
    }

    pub async fn cancel(
        &self,
        document_id: &DocumentId,
        requester: &SubjectId,
    ) -> Result<DocumentStatus, EngineError> {
        self.engine.cancel(document_id, requester).await
    }

    pub async fn balance(&self, subject: &SubjectId) -> Result<Balance, EngineError> {
        self.ledger.available_balance(subject, Utc::now().date_naive()).await
    }

    pub async fn deduct_manual(
        &self,
        request: ManualDeductionRequest,
    ) -> Result<(), EngineError> {
        if request.actor_privilege < self.manual_deduction_min_privilege {
            return Err(EngineError::InsufficientPrivilege {
                required: self.manual_deduction_min_privilege,
                actual: request.actor_privilege,
            });
        }

        self.ledger
            .deduct_manual(&request.subject, request.amount, &request.reason, &request.actor)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use timebank_core::audit::InMemoryAuditSink;
    use timebank_core::domain::document::{DocumentKind, DocumentStatus};
    use timebank_core::domain::grant::{
        CalculationBasis, Grant, GrantApprovalStatus, GrantId, GrantKind,
    };
    use timebank_core::domain::step::ApprovalRank;
    use timebank_core::domain::subject::SubjectId;
    use timebank_db::{InMemoryDocumentStore, InMemoryLedgerStore, LedgerStore};

    use crate::approval::{ApprovalEngine, SubmitRequest};
    use crate::errors::EngineError;
    use crate::ledger::LedgerService;
    use crate::notify::NoopNotifier;

    use super::{DocumentGateway, ManualDeductionRequest};

    fn subject(id: &str) -> SubjectId {
        SubjectId(id.to_string())
    }

    async fn gateway_with_grant(days: i64) -> (DocumentGateway, Arc<InMemoryLedgerStore>) {
        let documents = Arc::new(InMemoryDocumentStore::default());
        let ledger_store = Arc::new(InMemoryLedgerStore::default());
        let audit = Arc::new(InMemoryAuditSink::default());
        let ledger = LedgerService::new(ledger_store.clone(), audit.clone());
        let engine =
            ApprovalEngine::new(documents, ledger.clone(), audit, Arc::new(NoopNotifier));

        let today = Utc::now().date_naive();
        ledger_store
            .insert_grant_if_absent(Grant {
                id: GrantId("GRT-1".to_string()),
                subject: subject("emp-7"),
                kind: GrantKind::Manual,
                amount: Decimal::new(days, 0),
                granted_date: today - Duration::days(10),
                expiration_date: today + Duration::days(300),
                approval_status: GrantApprovalStatus::Approved,
                calculation_basis: CalculationBasis::new("administrative_adjustment"),
                created_at: Utc::now(),
            })
            .await
            .expect("seed grant");

        (DocumentGateway::new(engine, ledger, 3), ledger_store)
    }

    #[tokio::test]
    async fn submit_approve_and_query_through_the_facade() {
        let (gateway, _store) = gateway_with_grant(10).await;

        let view = gateway
            .submit(SubmitRequest {
                subject: subject("emp-7"),
                kind: DocumentKind::Leave,
                entitlement_amount: Decimal::new(1, 0),
                ranks: vec![ApprovalRank::Single { approver: subject("mgr-1") }],
            })
            .await
            .expect("submit");
        assert_eq!(view.status, DocumentStatus::Pending);
        assert_eq!(view.current_step, Some(1));

        let outcome = gateway.approve(&view.id, &subject("mgr-1")).await.expect("approve");
        assert!(outcome.is_final);

        let queried = gateway.document(&view.id).await.expect("query");
        assert_eq!(queried.status, DocumentStatus::Approved);
        assert_eq!(queried.current_step, None);

        let balance = gateway.balance(&subject("emp-7")).await.expect("balance");
        assert_eq!(balance.remaining, Decimal::new(9, 0));
    }

    #[tokio::test]
    async fn manual_deduction_requires_the_privilege_floor() {
        let (gateway, store) = gateway_with_grant(5).await;

        let error = gateway
            .deduct_manual(ManualDeductionRequest {
                subject: subject("emp-7"),
                amount: Decimal::ONE,
                reason: "correction".to_string(),
                actor: subject("jr-clerk"),
                actor_privilege: 1,
            })
            .await
            .expect_err("privilege 1 is below the floor");
        assert!(matches!(
            error,
            EngineError::InsufficientPrivilege { required: 3, actual: 1 }
        ));
        assert!(store
            .usages_for_subject(&subject("emp-7"))
            .await
            .expect("usages")
            .is_empty());

        gateway
            .deduct_manual(ManualDeductionRequest {
                subject: subject("emp-7"),
                amount: Decimal::ONE,
                reason: "correction".to_string(),
                actor: subject("hr-admin"),
                actor_privilege: 4,
            })
            .await
            .expect("privileged deduction");

        let balance = gateway.balance(&subject("emp-7")).await.expect("balance");
        assert_eq!(balance.remaining, Decimal::new(4, 0));
    }
}
