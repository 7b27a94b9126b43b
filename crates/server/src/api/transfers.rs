//! Transfer API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use courier_core::{
    metrics::STATE_TRANSITIONS, InboundTransfer, Job, JobRole, JobState, OrchestratorError,
    ProvisionedResource, ResourceManifest, TransferRequest,
};

use crate::state::AppState;

/// Maximum allowed limit for transfer queries
const MAX_LIMIT: usize = 1000;

/// Default limit for transfer queries
const DEFAULT_LIMIT: usize = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for initiating a transfer
#[derive(Debug, Deserialize)]
pub struct CreateTransferBody {
    /// Side of the transfer this process plays (defaults to initiator)
    #[serde(default = "default_role")]
    pub role: JobRole,
    pub request: TransferRequest,
}

fn default_role() -> JobRole {
    JobRole::Initiator
}

/// Query parameters for listing transfers
#[derive(Debug, Deserialize)]
pub struct ListTransfersParams {
    /// State to list (required, the store is indexed by state)
    pub state: String,
    /// Maximum number of transfers to return
    pub limit: Option<usize>,
}

/// Response carrying only the job id
#[derive(Debug, Serialize)]
pub struct TransferIdResponse {
    pub id: String,
}

/// Full view of a transfer job
#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub id: String,
    pub correlation_id: String,
    pub role: JobRole,
    pub state: JobState,
    pub request: TransferRequest,
    pub manifest: Option<ResourceManifest>,
    pub provisioned_resources: Vec<ProvisionedResource>,
    pub error_detail: Option<String>,
    pub retry_count: u32,
    pub created_at: String,
    pub state_timestamp: String,
}

impl From<Job> for TransferResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            correlation_id: job.correlation_id,
            role: job.role,
            state: job.state,
            request: job.request,
            manifest: job.manifest,
            provisioned_resources: job.provisioned_resources.resources,
            error_detail: job.error_detail,
            retry_count: job.retry_count,
            created_at: job.created_at.to_rfc3339(),
            state_timestamp: job.state_timestamp.to_rfc3339(),
        }
    }
}

/// Response for listing transfers
#[derive(Debug, Serialize)]
pub struct ListTransfersResponse {
    pub transfers: Vec<TransferResponse>,
    pub state: JobState,
    pub limit: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct TransferErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<TransferErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(TransferErrorResponse {
            error: error.into(),
        }),
    )
}

fn initiate_error(e: OrchestratorError) -> ApiError {
    match e {
        OrchestratorError::InvalidRequest(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Initiate a transfer (idempotent by request id)
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTransferBody>,
) -> Result<(StatusCode, Json<TransferIdResponse>), impl IntoResponse> {
    match state.orchestrator().initiate(body.role, body.request) {
        Ok(id) => Ok((StatusCode::CREATED, Json(TransferIdResponse { id }))),
        Err(e) => Err(initiate_error(e)),
    }
}

/// Accept a transfer request dispatched by a peer
///
/// The peer is acknowledged at its callback address once the executor job
/// exists.
pub async fn receive_transfer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InboundTransfer>,
) -> Result<Json<TransferIdResponse>, impl IntoResponse> {
    tracing::info!(
        correlation_id = %body.request.id,
        process_id = %body.process_id,
        "Received inbound transfer"
    );

    match state.orchestrator().receive_inbound(body).await {
        Ok(id) => Ok(Json(TransferIdResponse { id })),
        Err(e) => Err(initiate_error(e)),
    }
}

/// Get a transfer by job ID
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransferResponse>, impl IntoResponse> {
    match state.store().get(&id) {
        Ok(Some(job)) => Ok(Json(TransferResponse::from(job))),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Transfer not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// List transfers in a given state, oldest state change first
pub async fn list_transfers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTransfersParams>,
) -> Result<Json<ListTransfersResponse>, impl IntoResponse> {
    let job_state: JobState = match params.state.parse() {
        Ok(job_state) => job_state,
        Err(e) => return Err(api_error(StatusCode::BAD_REQUEST, e.to_string())),
    };
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    match state.store().next_for_state(job_state, limit) {
        Ok(jobs) => Ok(Json(ListTransfersResponse {
            transfers: jobs.into_iter().map(TransferResponse::from).collect(),
            state: job_state,
            limit,
        })),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Record the peer's acknowledgment of a sent transfer
pub async fn acknowledge_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TransferResponse>, impl IntoResponse> {
    let mut job = match state.store().get(&id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return Err(api_error(
                StatusCode::NOT_FOUND,
                format!("Transfer not found: {}", id),
            ));
        }
        Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    };

    if job.role != JobRole::Initiator || job.state != JobState::Sent {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!(
                "Cannot acknowledge transfer: {} job is in state {}",
                job.role, job.state
            ),
        ));
    }

    if let Err(e) = job.transition_acknowledged() {
        return Err(api_error(StatusCode::CONFLICT, e.to_string()));
    }
    match state.store().update_if_state(&job, JobState::Sent) {
        Ok(true) => {}
        Ok(false) => {
            return Err(api_error(
                StatusCode::CONFLICT,
                format!("Cannot acknowledge transfer: job {} left state sent", job.id),
            ));
        }
        Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }

    STATE_TRANSITIONS
        .with_label_values(&[JobState::Acknowledged.as_str()])
        .inc();
    tracing::info!(job_id = %job.id, correlation_id = %job.correlation_id, "Transfer acknowledged");

    Ok(Json(TransferResponse::from(job)))
}
