//! Types for transcode service operations.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the transcode service.
#[derive(Debug, Error)]
pub enum JobClientError {
    /// Job creation was rejected or the service was unreachable.
    #[error("Job submission failed{}: {body}", http_suffix(.status))]
    SubmissionFailed {
        /// Upstream HTTP status, if a response was received.
        status: Option<u16>,
        /// Upstream body or transport error text.
        body: String,
    },

    /// A status request failed. Callers treat this as transient.
    #[error("Job status request failed: {0}")]
    PollFailed(String),

    /// The finished artifact could not be downloaded.
    #[error("Result download failed: {0}")]
    DownloadFailed(String),

    /// The client could not be constructed.
    #[error("Invalid job service configuration: {0}")]
    Config(String),
}

fn http_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default()
}

impl JobClientError {
    /// Build a submission error from a transport failure (no response).
    pub fn unreachable(err: impl ToString) -> Self {
        JobClientError::SubmissionFailed {
            status: None,
            body: err.to_string(),
        }
    }
}

/// Opaque identifier of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
}

/// Reported state of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued or still running.
    Running,
    /// Finished; the artifact can be fetched from `result_url`.
    Succeeded { result_url: String },
    /// The service gave up on the job.
    Failed { message: String },
}

impl JobStatus {
    /// Whether this status ends polling.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// What to transcode and where the service should name the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitJobRequest {
    /// Publicly fetchable URL of the raw upload.
    pub source_url: String,
    /// File name the service gives the produced artifact.
    pub output_filename: String,
}

impl SubmitJobRequest {
    pub fn new(source_url: impl Into<String>, output_filename: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            output_filename: output_filename.into(),
        }
    }
}

/// Trait for transcode service backends.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Submit a transcode job for a fetchable source URL.
    async fn submit(&self, request: &SubmitJobRequest) -> Result<JobHandle, JobClientError>;

    /// Get the current status of a job.
    async fn poll(&self, job_id: &str) -> Result<JobStatus, JobClientError>;

    /// Download the finished artifact.
    async fn fetch_result(&self, result_url: &str) -> Result<Bytes, JobClientError>;
}
