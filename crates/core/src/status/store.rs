//! Status store trait and types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for status store operations.
#[derive(Debug, Error)]
pub enum StatusError {
    /// No record exists for the source path.
    #[error("No transcode record for {0}")]
    NotFound(String),

    /// The record already reached a terminal state.
    #[error("Transcode record for {0} is already terminal")]
    AlreadyTerminal(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Lifecycle state of a transcode record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeStatus {
    /// Nothing submitted yet. Never stored; a missing record is pending.
    Pending,
    /// A job was submitted and is being tracked.
    Processing,
    /// The artifact was written to `output_path`.
    Completed,
    /// The job or its finalization failed.
    Failed,
}

impl TranscodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeStatus::Pending => "pending",
            TranscodeStatus::Processing => "processing",
            TranscodeStatus::Completed => "completed",
            TranscodeStatus::Failed => "failed",
        }
    }

    /// Whether no further transitions are permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscodeStatus::Completed | TranscodeStatus::Failed)
    }
}

impl fmt::Display for TranscodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TranscodeStatus::Pending),
            "processing" => Ok(TranscodeStatus::Processing),
            "completed" => Ok(TranscodeStatus::Completed),
            "failed" => Ok(TranscodeStatus::Failed),
            other => Err(format!("unknown transcode status: {}", other)),
        }
    }
}

/// Persisted state of one source file's transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeRecord {
    /// Object path of the raw upload (natural key).
    pub source_path: String,
    pub status: TranscodeStatus,
    /// External job id of the current generation.
    pub job_id: Option<String>,
    /// Set only when `status == Completed`.
    pub output_path: Option<String>,
    /// Set only when `status == Failed`.
    pub error_message: Option<String>,
    /// Bumped whenever a different job is attached to the same source path.
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    /// When the current generation's job was attached.
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a terminal write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// The record moved to the requested terminal state.
    Applied,
    /// The record was already terminal; nothing changed.
    AlreadyTerminal,
    /// A newer job owns the record; nothing changed.
    Superseded,
}

/// Filter for querying records.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    pub status: Option<TranscodeStatus>,
    /// Only records last updated strictly before this instant.
    pub updated_before: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusFilter {
    pub fn new() -> Self {
        Self {
            status: None,
            updated_before: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: TranscodeStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_updated_before(mut self, before: DateTime<Utc>) -> Self {
        self.updated_before = Some(before);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Whether a record satisfies the status and age conditions.
    pub fn matches(&self, record: &TranscodeRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(before) = self.updated_before {
            if record.updated_at >= before {
                return false;
            }
        }
        true
    }
}

/// Trait for status storage backends.
///
/// Implementations must upsert atomically and never change a terminal record.
pub trait StatusStore: Send + Sync {
    /// Get the record for a source path.
    fn get(&self, source_path: &str) -> Result<Option<TranscodeRecord>, StatusError>;

    /// List records matching the filter, least recently updated first.
    fn list(&self, filter: &StatusFilter) -> Result<Vec<TranscodeRecord>, StatusError>;

    /// Count records matching the filter (ignores limit/offset).
    fn count(&self, filter: &StatusFilter) -> Result<i64, StatusError>;

    /// Upsert the record as `processing` with the given job id.
    ///
    /// Re-delivery with the same job id is a no-op apart from `updated_at`.
    /// A different job id increments the generation. Fails with
    /// `AlreadyTerminal` if the record is completed or failed.
    fn mark_processing(
        &self,
        source_path: &str,
        job_id: &str,
    ) -> Result<TranscodeRecord, StatusError>;

    /// Move the record to `completed` if it is still owned by `generation`.
    fn mark_completed(
        &self,
        source_path: &str,
        generation: u64,
        output_path: &str,
    ) -> Result<Transition, StatusError>;

    /// Move the record to `failed` if it is still owned by `generation`.
    fn mark_failed(
        &self,
        source_path: &str,
        generation: u64,
        error_message: &str,
    ) -> Result<Transition, StatusError>;

    /// Re-stamp `updated_at` of a processing record owned by `generation`.
    /// Returns false if the record is terminal, missing or superseded.
    fn refresh_claim(&self, source_path: &str, generation: u64) -> Result<bool, StatusError>;
}
