//! Testing utilities and mock implementations.
//!
//! This module provides in-memory implementations of every external
//! collaborator, so the trigger, pollers and orchestrator can be exercised
//! without a transcoding service, a bucket or a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use vidrelay_core::testing::{MockJobClient, MockObjectStore, MockStatusStore};
//!
//! let job_client = MockJobClient::new();
//! job_client.set_next_job_id("job-1");
//! job_client.push_poll_results("job-1", vec![Ok(JobStatus::Running)]);
//! job_client.set_result("https://x/out.mp4", Bytes::from_static(b"..."));
//! ```

mod mock_job_client;
mod mock_object_store;
mod mock_status_store;

use std::sync::{Mutex, MutexGuard};

pub use mock_job_client::MockJobClient;
pub use mock_object_store::MockObjectStore;
pub use mock_status_store::MockStatusStore;

use crate::orchestrator::{OrchestratorConfig, ReconcileConfig};

/// Lock a mock's state, ignoring poisoning from a panicked test thread.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Orchestrator settings with millisecond timings for tests.
///
/// The periodic reconciliation loop is disabled.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        poll_interval_ms: 10,
        timeout_secs: 5,
        finalize_retry_delay_ms: 10,
        reconcile: ReconcileConfig {
            enabled: false,
            interval_secs: 1,
            stale_after_secs: 600,
            ..ReconcileConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{Duration, Utc};

    use crate::status::{TranscodeRecord, TranscodeStatus};

    /// A `processing` record last touched `age` ago.
    pub fn processing_record(source_path: &str, job_id: &str, age: Duration) -> TranscodeRecord {
        let at = Utc::now() - age;
        TranscodeRecord {
            source_path: source_path.to_string(),
            status: TranscodeStatus::Processing,
            job_id: Some(job_id.to_string()),
            output_path: None,
            error_message: None,
            generation: 1,
            created_at: at,
            submitted_at: at,
            updated_at: at,
        }
    }
}
