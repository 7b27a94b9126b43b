//! Orchestrator API handlers.

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Orchestrator status response
#[derive(Debug, Serialize)]
pub struct OrchestratorStatusResponse {
    /// Whether the control loop is currently running
    pub running: bool,
    /// Maximum jobs pulled per phase per cycle
    pub batch_size: usize,
    /// Stored jobs per state
    pub jobs: BTreeMap<String, u64>,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get orchestrator status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatusResponse> {
    let orchestrator = state.orchestrator();
    let status = orchestrator.status();
    Json(OrchestratorStatusResponse {
        running: status.running,
        batch_size: orchestrator.config().batch_size,
        jobs: status.jobs,
    })
}

/// Start the orchestrator
pub async fn start(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.orchestrator().start().await;
    Json(MessageResponse {
        message: "Orchestrator started".to_string(),
    })
}

/// Stop the orchestrator
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.orchestrator().stop().await;
    Json(MessageResponse {
        message: "Orchestrator stopped".to_string(),
    })
}
