use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use timebank_core::domain::balance::Balance;
use timebank_core::domain::document::{DocumentId, DocumentKind, DocumentStatus};
use timebank_core::domain::step::ApprovalRank;
use timebank_core::domain::subject::SubjectId;
use timebank_core::errors::{LedgerError, WorkflowError};
use timebank_engine::{
    ApprovalOutcome, DeductionOutcome, DocumentGateway, DocumentView, EngineError,
    ManualDeductionRequest, SubmitRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub gateway: DocumentGateway,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(submit))
        .route("/documents/{id}", get(document))
        .route("/documents/{id}/approve", post(approve))
        .route("/documents/{id}/reject", post(reject))
        .route("/documents/{id}/cancel", post(cancel))
        .route("/documents/{id}/delegate", post(delegate))
        .route("/subjects/{id}/balance", get(balance))
        .route("/ledger/manual-deduction", post(manual_deduction))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
    pub subject: SubjectId,
    pub kind: DocumentKind,
    pub entitlement_amount: Decimal,
    pub ranks: Vec<ApprovalRank>,
}

#[derive(Debug, Deserialize)]
pub struct ActorBody {
    pub approver: SubjectId,
}

#[derive(Debug, Deserialize)]
pub struct RejectBody {
    pub approver: SubjectId,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub requester: SubjectId,
}

#[derive(Debug, Deserialize)]
pub struct DelegateBody {
    pub approver: SubjectId,
    pub delegate: SubjectId,
}

#[derive(Debug, Deserialize)]
pub struct ManualDeductionBody {
    pub subject: SubjectId,
    pub amount: Decimal,
    pub reason: String,
    pub actor: SubjectId,
    pub actor_privilege: u8,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub status: DocumentStatus,
    pub current_step: Option<u32>,
    pub is_final: bool,
    pub deduction: DeductionView,
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeductionView {
    NotRequired,
    Posted,
    AlreadyPosted,
    Failed { reason: String },
}

impl From<ApprovalOutcome> for ApproveResponse {
    fn from(outcome: ApprovalOutcome) -> Self {
        Self {
            status: outcome.status,
            current_step: outcome.current_step,
            is_final: outcome.is_final,
            deduction: match outcome.deduction {
                DeductionOutcome::NotRequired => DeductionView::NotRequired,
                DeductionOutcome::Posted => DeductionView::Posted,
                DeductionOutcome::AlreadyPosted => DeductionView::AlreadyPosted,
                DeductionOutcome::Failed { reason } => DeductionView::Failed { reason },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: DocumentStatus,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn error_response(error: EngineError) -> ApiError {
    let status = match &error {
        EngineError::Workflow(WorkflowError::NoPendingStep { .. })
        | EngineError::Workflow(WorkflowError::NotRequester { .. })
        | EngineError::InsufficientPrivilege { .. } => StatusCode::FORBIDDEN,
        EngineError::Workflow(WorkflowError::DocumentNotFound(_)) => StatusCode::NOT_FOUND,
        EngineError::Workflow(WorkflowError::PreconditionFailed { .. }) => StatusCode::CONFLICT,
        EngineError::Workflow(WorkflowError::InvalidSubmission(_))
        | EngineError::Ledger(LedgerError::InsufficientBalance { .. })
        | EngineError::Ledger(LedgerError::InvalidAmount { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        EngineError::Ledger(LedgerError::DataIntegrity(_)) | EngineError::DataIntegrity(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        EngineError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(ErrorBody { error: error.to_string() }))
}

pub async fn submit(
    State(state): State<AppState>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<DocumentView>), ApiError> {
    let view = state
        .gateway
        .submit(SubmitRequest {
            subject: body.subject,
            kind: body.kind,
            entitlement_amount: body.entitlement_amount,
            ranks: body.ranks,
        })
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>, ApiError> {
    let view = state.gateway.document(&DocumentId(id)).await.map_err(error_response)?;
    Ok(Json(view))
}

pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ActorBody>,
) -> Result<Json<ApproveResponse>, ApiError> {
    let outcome = state
        .gateway
        .approve(&DocumentId(id), &body.approver)
        .await
        .map_err(error_response)?;
    Ok(Json(outcome.into()))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RejectBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .gateway
        .reject(&DocumentId(id), &body.approver, &body.reason)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse { status }))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CancelBody>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .gateway
        .cancel(&DocumentId(id), &body.requester)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse { status }))
}

pub async fn delegate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DelegateBody>,
) -> Result<StatusCode, ApiError> {
    state
        .gateway
        .delegate(&DocumentId(id), &body.approver, &body.delegate)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn balance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Balance>, ApiError> {
    let balance = state.gateway.balance(&SubjectId(id)).await.map_err(error_response)?;
    Ok(Json(balance))
}

pub async fn manual_deduction(
    State(state): State<AppState>,
    Json(body): Json<ManualDeductionBody>,
) -> Result<StatusCode, ApiError> {
    state
        .gateway
        .deduct_manual(ManualDeductionRequest {
            subject: body.subject,
            amount: body.amount,
            reason: body.reason,
            actor: body.actor,
            actor_privilege: body.actor_privilege,
        })
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}
