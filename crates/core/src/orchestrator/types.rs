//! Types for the transcode orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job_client::JobClientError;
use crate::status::StatusError;
use crate::storage::StorageError;

/// Object-creation notification from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCreatedEvent {
    pub bucket_id: String,
    /// Object path within the bucket.
    pub name: String,
}

impl ObjectCreatedEvent {
    pub fn new(bucket_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket_id: bucket_id.into(),
            name: name.into(),
        }
    }
}

/// Why an event was filtered out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    /// Path does not end in the configured source extension.
    WrongExtension,
    /// Event is for a bucket other than the watched one.
    OtherBucket,
    /// Path is under the output prefix (one of our own artifacts).
    OutputObject,
    /// The source already has a completed or failed record.
    AlreadyTerminal,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::WrongExtension => "wrong_extension",
            IgnoreReason::OtherBucket => "other_bucket",
            IgnoreReason::OutputObject => "output_object",
            IgnoreReason::AlreadyTerminal => "already_terminal",
        }
    }
}

/// Everything a poller needs to track one submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollJob {
    pub source_path: String,
    pub job_id: String,
    /// Record generation this poller is allowed to finish.
    pub generation: u64,
    pub output_path: String,
}

/// Successful result of handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A job was submitted and the record is `processing`.
    Accepted(PollJob),
    /// Filtered out; nothing was called.
    Ignored(IgnoreReason),
}

/// Failures of the synchronous trigger path.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// No fetchable URL could be built for the source. No record is written.
    #[error("could not resolve source URL: {0}")]
    ResolutionFailed(#[source] StorageError),

    /// The transcoding service rejected the job or was unreachable.
    #[error("{0}")]
    SubmissionFailed(#[source] JobClientError),

    /// The status record could not be read or written.
    #[error("status store error: {0}")]
    Store(#[from] StatusError),
}

impl TriggerError {
    /// Stable identifier used in API error bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerError::ResolutionFailed(_) => "resolution_failed",
            TriggerError::SubmissionFailed(_) => "submission_failed",
            TriggerError::Store(_) => "store_failed",
        }
    }
}

/// How a poller finished. Logged and counted; never propagated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Artifact written and record completed.
    Completed { output_path: String },
    /// The service reported failure; record failed.
    Failed { message: String },
    /// Transcode succeeded but download/upload kept failing; record failed.
    FinalizeFailed { error: String },
    /// Budget elapsed; record left `processing`.
    TimedOut,
    /// A newer generation or another writer owns the record.
    Superseded,
    /// Orchestrator shut down; record left `processing`.
    Cancelled,
    /// The terminal write itself failed.
    RecordWriteFailed { error: String },
}

impl PollOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            PollOutcome::Completed { .. } => "completed",
            PollOutcome::Failed { .. } => "failed",
            PollOutcome::FinalizeFailed { .. } => "finalize_failed",
            PollOutcome::TimedOut => "timed_out",
            PollOutcome::Superseded => "superseded",
            PollOutcome::Cancelled => "cancelled",
            PollOutcome::RecordWriteFailed { .. } => "record_write_failed",
        }
    }
}

/// A job being tracked by a poller in this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveJob {
    pub source_path: String,
    pub job_id: String,
    pub generation: u64,
    pub started_at: DateTime<Utc>,
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// Whether background loops are running.
    pub running: bool,
    /// Pollers running in this process.
    pub active_jobs: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
}

/// Result of one reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Stale records given a new poller.
    pub reattached: usize,
    /// Records marked failed because they exceeded the give-up age.
    pub abandoned: usize,
    /// Records skipped because a poller here already tracks them.
    pub skipped: usize,
}
