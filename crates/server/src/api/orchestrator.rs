//! Orchestrator API handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use vidrelay_core::orchestrator::ActiveJob;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Orchestrator status response
#[derive(Debug, Serialize)]
pub struct OrchestratorStatusResponse {
    /// Whether the orchestrator is currently running
    pub running: bool,
    /// Pollers attached in this process
    pub active_pollers: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub active_jobs: Vec<ActiveJob>,
}

/// Result of a manual reconciliation sweep
#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub reattached: usize,
    pub abandoned: usize,
    pub skipped: usize,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct OrchestratorErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get orchestrator status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<OrchestratorStatusResponse> {
    let orchestrator = state.orchestrator();
    let status = orchestrator.status().await;
    Json(OrchestratorStatusResponse {
        running: status.running,
        active_pollers: status.active_jobs,
        processing_count: status.processing_count,
        completed_count: status.completed_count,
        failed_count: status.failed_count,
        active_jobs: orchestrator.active_jobs().await,
    })
}

/// Run one reconciliation sweep now
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileResponse>, impl IntoResponse> {
    match state.orchestrator().reconcile_once().await {
        Ok(report) => Ok(Json(ReconcileResponse {
            reattached: report.reattached,
            abandoned: report.abandoned,
            skipped: report.skipped,
        })),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(OrchestratorErrorResponse {
                error: e.to_string(),
            }),
        )),
    }
}
