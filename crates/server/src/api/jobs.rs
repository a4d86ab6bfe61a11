//! Transcode status queries.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vidrelay_core::{StatusFilter, TranscodeRecord, TranscodeStatus};

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    /// Filter by status (`processing`, `completed`, `failed`)
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A status record as served over HTTP
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub source_path: String,
    pub status: TranscodeStatus,
    pub job_id: Option<String>,
    pub output_path: Option<String>,
    pub error_message: Option<String>,
    pub generation: u64,
    pub created_at: String,
    pub submitted_at: String,
    pub updated_at: String,
}

impl From<TranscodeRecord> for JobResponse {
    fn from(record: TranscodeRecord) -> Self {
        Self {
            source_path: record.source_path,
            status: record.status,
            job_id: record.job_id,
            output_path: record.output_path,
            error_message: record.error_message,
            generation: record.generation,
            created_at: record.created_at.to_rfc3339(),
            submitted_at: record.submitted_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> (StatusCode, Json<JobErrorResponse>) {
    (
        status,
        Json(JobErrorResponse {
            error: error.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the record for a source path. No record means the upload was never
/// accepted (pending).
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(source_path): Path<String>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    match state.status_store().get(&source_path) {
        Ok(Some(record)) => Ok(Json(JobResponse::from(record))),
        Ok(None) => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("No transcode record for: {}", source_path),
        )),
        Err(e) => Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    }
}

/// List records, least recently updated first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, impl IntoResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let mut filter = StatusFilter::new().with_limit(limit).with_offset(offset);

    if let Some(ref status) = params.status {
        match status.parse::<TranscodeStatus>() {
            Ok(status) => filter = filter.with_status(status),
            Err(e) => return Err(error_response(StatusCode::BAD_REQUEST, e)),
        }
    }

    let jobs = match state.status_store().list(&filter) {
        Ok(jobs) => jobs,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    };

    // Total count ignores pagination
    let total = match state.status_store().count(&filter) {
        Ok(count) => count,
        Err(e) => return Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e)),
    };

    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}
