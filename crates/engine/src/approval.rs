use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use timebank_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use timebank_core::domain::document::{Document, DocumentId, DocumentKind, DocumentStatus};
use timebank_core::domain::step::{ApprovalRank, Step, StepId, StepStatus};
use timebank_core::domain::subject::SubjectId;
use timebank_core::errors::{DocumentIntegrityError, LedgerError, WorkflowError};
use timebank_core::workflow::{plan_steps, resolve_after_approval, StepResolution};
use timebank_db::DocumentStore;

use crate::errors::EngineError;
use crate::ledger::{DeductionReceipt, LedgerService};
use crate::notify::{Notification, NotificationDispatch};

#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub subject: SubjectId,
    pub kind: DocumentKind,
    pub entitlement_amount: Decimal,
    pub ranks: Vec<ApprovalRank>,
}

/// What an approval call tells the gateway. `deduction` reports the ledger
/// side-effect of a final approval; anything but `Failed` means the
/// document and ledger agree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalOutcome {
    pub status: DocumentStatus,
    pub current_step: Option<u32>,
    pub is_final: bool,
    pub deduction: DeductionOutcome,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeductionOutcome {
    NotRequired,
    Posted,
    AlreadyPosted,
    /// Final approval committed but the ledger could not cover the cost.
    /// The divergence is deliberate: the approval is never rolled back and
    /// the shortfall is reconciled administratively.
    Failed { reason: String },
}

/// Drives a document's steps to completion and triggers ledger effects
/// exactly once. Every transition re-verifies its precondition through a
/// conditional update; a vanished precondition surfaces as
/// `PreconditionFailed` and the engine never retries on its own.
#[derive(Clone)]
pub struct ApprovalEngine {
    documents: Arc<dyn DocumentStore>,
    ledger: LedgerService,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationDispatch>,
}

impl ApprovalEngine {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        ledger: LedgerService,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationDispatch>,
    ) -> Self {
        Self { documents, ledger, audit, notifier }
    }

    /// Creates the document with its bulk-planned steps. Costed kinds are
    /// validated against the subject's available balance before anything
    /// is written.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Document, EngineError> {
        let seeds = plan_steps(&request.ranks)?;

        if request.entitlement_amount < Decimal::ZERO {
            return Err(WorkflowError::InvalidSubmission(
                "entitlement amount must not be negative".to_string(),
            )
            .into());
        }
        if request.entitlement_amount > Decimal::ZERO {
            if !timebank_core::is_half_day_multiple(request.entitlement_amount) {
                return Err(WorkflowError::InvalidSubmission(
                    "entitlement amount must be a multiple of 0.5 days".to_string(),
                )
                .into());
            }
            let today = Utc::now().date_naive();
            let balance = self.ledger.available_balance(&request.subject, today).await?;
            if balance.remaining < request.entitlement_amount {
                return Err(LedgerError::InsufficientBalance {
                    requested: request.entitlement_amount,
                    available: balance.remaining,
                }
                .into());
            }
        }

        let now = Utc::now();
        let document = Document {
            id: DocumentId(format!("DOC-{}", Uuid::new_v4())),
            subject: request.subject.clone(),
            kind: request.kind,
            status: DocumentStatus::Pending,
            current_step: Some(1),
            entitlement_amount: request.entitlement_amount,
            created_at: now,
            approved_at: None,
        };

        let steps: Vec<Step> = seeds
            .into_iter()
            .map(|seed| Step {
                id: StepId(format!("STEP-{}", Uuid::new_v4())),
                document_id: document.id.clone(),
                order: seed.order,
                approver: seed.approver,
                delegate: None,
                mode: seed.mode,
                status: seed.status,
                is_last: seed.is_last,
                approved_at: None,
            })
            .collect();

        let first_rank_approvers: Vec<SubjectId> = steps
            .iter()
            .filter(|step| step.order == 1)
            .map(|step| step.approver.clone())
            .collect();

        self.documents.insert_with_steps(document.clone(), steps).await?;

        info!(
            event_name = "workflow.document_submitted",
            document_id = %document.id.0,
            subject_id = %document.subject.0,
            kind = document.kind.as_str(),
            "document submitted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(document.id.clone()),
                Some(document.subject.clone()),
                Uuid::new_v4().to_string(),
                "workflow.document_submitted",
                AuditCategory::Workflow,
                document.subject.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("kind", document.kind.as_str())
            .with_metadata("entitlement_amount", document.entitlement_amount.to_string()),
        );
        self.notifier.dispatch(Notification::StepActivated {
            document_id: document.id.clone(),
            order: 1,
            approvers: first_rank_approvers,
        });

        Ok(document)
    }

    /// Approves the actor's pending step and applies the agreement rule.
    /// Holding a pending step (as approver or delegate) is the sole
    /// authorization check, and it is re-verified by the conditional
    /// update rather than trusted from the read.
    pub async fn approve(
        &self,
        document_id: &DocumentId,
        actor: &SubjectId,
    ) -> Result<ApprovalOutcome, EngineError> {
        let document = self.load_document(document_id).await?;

        let step = self
            .documents
            .pending_step_for(document_id, actor)
            .await?
            .ok_or_else(|| WorkflowError::no_pending_step(document_id, actor))?;

        let now = Utc::now();
        if !self.documents.approve_step(&step.id, now).await? {
            return Err(WorkflowError::precondition_failed(
                document_id,
                "step was resolved by a concurrent call",
            )
            .into());
        }
        self.emit_step_audit(&document, &step, actor, StepStatus::Approved);

        let steps = self.documents.steps_for(document_id).await?;
        match resolve_after_approval(&steps, step.order) {
            StepResolution::AwaitingPeers => Ok(ApprovalOutcome {
                status: DocumentStatus::Pending,
                current_step: Some(step.order),
                is_final: false,
                deduction: DeductionOutcome::NotRequired,
            }),
            StepResolution::Advance { next_order } => {
                if !self.documents.advance_document(document_id, step.order, next_order).await? {
                    return Err(WorkflowError::precondition_failed(
                        document_id,
                        "document moved past this order concurrently",
                    )
                    .into());
                }

                let activated: Vec<SubjectId> = steps
                    .iter()
                    .filter(|candidate| candidate.order == next_order)
                    .map(|candidate| candidate.approver.clone())
                    .collect();
                self.notifier.dispatch(Notification::StepActivated {
                    document_id: document_id.clone(),
                    order: next_order,
                    approvers: activated,
                });

                Ok(ApprovalOutcome {
                    status: DocumentStatus::Pending,
                    current_step: Some(next_order),
                    is_final: false,
                    deduction: DeductionOutcome::NotRequired,
                })
            }
            StepResolution::Complete => {
                if !self.documents.complete_document(document_id, step.order, now).await? {
                    return Err(WorkflowError::precondition_failed(
                        document_id,
                        "document was finalized concurrently",
                    )
                    .into());
                }

                info!(
                    event_name = "workflow.document_approved",
                    document_id = %document_id.0,
                    subject_id = %document.subject.0,
                    "document fully approved"
                );
                self.notifier.dispatch(Notification::DocumentApproved {
                    document_id: document_id.clone(),
                    subject: document.subject.clone(),
                });

                let deduction = self.settle_entitlement(&document).await;
                Ok(ApprovalOutcome {
                    status: DocumentStatus::Approved,
                    current_step: None,
                    is_final: true,
                    deduction,
                })
            }
        }
    }

    /// Any pending-step holder may reject; siblings stay untouched as the
    /// historical record.
    pub async fn reject(
        &self,
        document_id: &DocumentId,
        actor: &SubjectId,
        reason: &str,
    ) -> Result<DocumentStatus, EngineError> {
        let document = self.load_document(document_id).await?;

        let step = self
            .documents
            .pending_step_for(document_id, actor)
            .await?
            .ok_or_else(|| WorkflowError::no_pending_step(document_id, actor))?;

        if !self.documents.reject_step(&step.id).await? {
            return Err(WorkflowError::precondition_failed(
                document_id,
                "step was resolved by a concurrent call",
            )
            .into());
        }
        self.emit_step_audit(&document, &step, actor, StepStatus::Rejected);

        if !self.documents.reject_document(document_id).await? {
            return Err(WorkflowError::precondition_failed(
                document_id,
                "document left pending state concurrently",
            )
            .into());
        }

        info!(
            event_name = "workflow.document_rejected",
            document_id = %document_id.0,
            actor = %actor.0,
            "document rejected"
        );
        self.notifier.dispatch(Notification::DocumentRejected {
            document_id: document_id.clone(),
            subject: document.subject.clone(),
            reason: reason.to_string(),
        });

        Ok(DocumentStatus::Rejected)
    }

    /// Swaps the effective actor on the approver's pending step. The
    /// approver of record stays for audit; status does not change.
    pub async fn delegate(
        &self,
        document_id: &DocumentId,
        approver: &SubjectId,
        delegate: &SubjectId,
    ) -> Result<(), EngineError> {
        self.load_document(document_id).await?;

        let step = self
            .documents
            .pending_step_for(document_id, approver)
            .await?
            .ok_or_else(|| WorkflowError::no_pending_step(document_id, approver))?;

        if !self.documents.set_delegate(&step.id, delegate).await? {
            return Err(WorkflowError::precondition_failed(
                document_id,
                "step was resolved before delegation",
            )
            .into());
        }

        self.audit.emit(
            AuditEvent::new(
                Some(document_id.clone()),
                Some(step.approver.clone()),
                Uuid::new_v4().to_string(),
                "workflow.step_delegated",
                AuditCategory::Workflow,
                approver.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("delegate", delegate.0.clone())
            .with_metadata("order", step.order.to_string()),
        );

        Ok(())
    }

    /// Requester-only cancellation of a pending document.
    pub async fn cancel(
        &self,
        document_id: &DocumentId,
        requester: &SubjectId,
    ) -> Result<DocumentStatus, EngineError> {
        let document = self.load_document(document_id).await?;
        if &document.subject != requester {
            return Err(WorkflowError::not_requester(document_id, requester).into());
        }

        if !self.documents.cancel_document(document_id).await? {
            return Err(WorkflowError::precondition_failed(
                document_id,
                "document is no longer pending",
            )
            .into());
        }

        info!(
            event_name = "workflow.document_cancelled",
            document_id = %document_id.0,
            actor = %requester.0,
            "document cancelled by requester"
        );
        self.audit.emit(AuditEvent::new(
            Some(document_id.clone()),
            Some(document.subject),
            Uuid::new_v4().to_string(),
            "workflow.document_cancelled",
            AuditCategory::Workflow,
            requester.0.clone(),
            AuditOutcome::Success,
        ));

        Ok(DocumentStatus::Cancelled)
    }

    pub async fn document(&self, document_id: &DocumentId) -> Result<Document, EngineError> {
        self.load_document(document_id).await
    }

    pub async fn steps(&self, document_id: &DocumentId) -> Result<Vec<Step>, EngineError> {
        Ok(self.documents.steps_for(document_id).await?)
    }

    async fn load_document(&self, document_id: &DocumentId) -> Result<Document, EngineError> {
        let document = self
            .documents
            .find_document(document_id)
            .await?
            .ok_or_else(|| WorkflowError::DocumentNotFound(document_id.0.clone()))?;

        if !document.invariant_holds() {
            let integrity = DocumentIntegrityError {
                document_id: document.id.0.clone(),
                status: document.status,
                detail: "terminal status and current step disagree".to_string(),
            };
            return Err(EngineError::DataIntegrity(integrity.to_string()));
        }

        Ok(document)
    }

    async fn settle_entitlement(&self, document: &Document) -> DeductionOutcome {
        if !document.consumes_entitlement() {
            return DeductionOutcome::NotRequired;
        }

        let used_date = Utc::now().date_naive();
        match self
            .ledger
            .deduct(&document.id, &document.subject, document.entitlement_amount, used_date)
            .await
        {
            Ok(DeductionReceipt::Posted { .. }) => DeductionOutcome::Posted,
            Ok(DeductionReceipt::AlreadyPosted) => DeductionOutcome::AlreadyPosted,
            Err(error) => {
                // The approval already committed; record the divergence for
                // administrative reconciliation instead of rolling back.
                warn!(
                    event_name = "ledger.deduction_failed",
                    document_id = %document.id.0,
                    subject_id = %document.subject.0,
                    error = %error,
                    "approved document could not be settled against the ledger"
                );
                self.audit.emit(
                    AuditEvent::new(
                        Some(document.id.clone()),
                        Some(document.subject.clone()),
                        Uuid::new_v4().to_string(),
                        "ledger.deduction_failed",
                        AuditCategory::Ledger,
                        "approval-engine",
                        AuditOutcome::Failed,
                    )
                    .with_metadata("amount", document.entitlement_amount.to_string())
                    .with_metadata("error", error.to_string()),
                );
                DeductionOutcome::Failed { reason: error.to_string() }
            }
        }
    }

    fn emit_step_audit(
        &self,
        document: &Document,
        step: &Step,
        actor: &SubjectId,
        new_status: StepStatus,
    ) {
        self.audit.emit(
            AuditEvent::new(
                Some(document.id.clone()),
                Some(document.subject.clone()),
                Uuid::new_v4().to_string(),
                match new_status {
                    StepStatus::Approved => "workflow.step_approved",
                    StepStatus::Rejected => "workflow.step_rejected",
                    _ => "workflow.step_updated",
                },
                AuditCategory::Workflow,
                actor.0.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("order", step.order.to_string())
            .with_metadata("approver_of_record", step.approver.0.clone())
            .with_metadata("old_status", step.status.as_str())
            .with_metadata("new_status", new_status.as_str()),
        );
    }
}
