//! Storage event webhook.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;
use vidrelay_core::{ObjectCreatedEvent, TriggerOutcome};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Body returned for an event that started a job (202) or was ignored (200).
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventResponse {
    Accepted {
        source_path: String,
        job_id: String,
        generation: u64,
    },
    Ignored {
        reason: String,
    },
}

/// Error response
#[derive(Debug, Serialize)]
pub struct EventErrorResponse {
    pub error: String,
    /// Stable failure kind (`resolution_failed`, `submission_failed`, `store_failed`)
    pub kind: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle an object-created notification.
///
/// Returns once the job is submitted and recorded; polling continues in
/// a detached task owned by the orchestrator.
pub async fn object_created(
    State(state): State<Arc<AppState>>,
    Json(event): Json<ObjectCreatedEvent>,
) -> Result<(StatusCode, Json<EventResponse>), impl IntoResponse> {
    match state.orchestrator().handle_event(&event).await {
        Ok(TriggerOutcome::Accepted(job)) => Ok((
            StatusCode::ACCEPTED,
            Json(EventResponse::Accepted {
                source_path: job.source_path,
                job_id: job.job_id,
                generation: job.generation,
            }),
        )),
        Ok(TriggerOutcome::Ignored(reason)) => Ok((
            StatusCode::OK,
            Json(EventResponse::Ignored {
                reason: reason.as_str().to_string(),
            }),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(EventErrorResponse {
                error: e.to_string(),
                kind: e.kind().to_string(),
            }),
        )),
    }
}
