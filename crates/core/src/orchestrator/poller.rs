//! Poller/finalizer for one submitted job.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::job_client::{JobClient, JobStatus};
use crate::metrics;
use crate::status::{StatusStore, Transition};
use crate::storage::ObjectStore;

use super::config::OrchestratorConfig;
use super::paths::content_type_for;
use super::types::{PollJob, PollOutcome};

/// Prefix of the error recorded when the artifact could not be stored.
pub const FINALIZE_FAILED_PREFIX: &str = "transcode succeeded but finalize failed";

/// Polls a job until it reaches a terminal state or the budget runs out,
/// then writes the artifact and the terminal record.
pub struct Poller {
    config: OrchestratorConfig,
    job_client: Arc<dyn JobClient>,
    status_store: Arc<dyn StatusStore>,
    object_store: Arc<dyn ObjectStore>,
}

impl Poller {
    pub fn new(
        config: OrchestratorConfig,
        job_client: Arc<dyn JobClient>,
        status_store: Arc<dyn StatusStore>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            job_client,
            status_store,
            object_store,
        }
    }

    /// Track `job` until an outcome is reached.
    ///
    /// A message on `shutdown` stops polling and leaves the record as is.
    pub async fn run(&self, job: &PollJob, mut shutdown: broadcast::Receiver<()>) -> PollOutcome {
        let deadline = Instant::now() + self.config.timeout();

        while Instant::now() < deadline {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(path = %job.source_path, job_id = %job.job_id, "Poller cancelled");
                    return PollOutcome::Cancelled;
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }

            if self.is_superseded(job) {
                info!(
                    path = %job.source_path,
                    generation = job.generation,
                    "Record no longer owned by this job; stopping"
                );
                return PollOutcome::Superseded;
            }

            match self.job_client.poll(&job.job_id).await {
                Ok(JobStatus::Running) => {
                    debug!(job_id = %job.job_id, "Job still running");
                }
                Ok(JobStatus::Succeeded { result_url }) => {
                    info!(job_id = %job.job_id, "Job succeeded, finalizing");
                    return self.finalize(job, &result_url).await;
                }
                Ok(JobStatus::Failed { message }) => {
                    info!(job_id = %job.job_id, "Job failed: {}", message);
                    return self.record_failure(job, message, false);
                }
                Err(e) => {
                    metrics::POLL_ERRORS.inc();
                    warn!(job_id = %job.job_id, "Status request failed, will retry: {}", e);
                }
            }
        }

        warn!(
            path = %job.source_path,
            job_id = %job.job_id,
            timeout_secs = self.config.timeout_secs,
            "Polling budget exhausted; record left processing"
        );
        PollOutcome::TimedOut
    }

    /// Whether a newer generation or another writer owns the record.
    fn is_superseded(&self, job: &PollJob) -> bool {
        match self.status_store.get(&job.source_path) {
            Ok(Some(record)) => record.generation != job.generation || record.status.is_terminal(),
            Ok(None) => true,
            Err(e) => {
                warn!(path = %job.source_path, "Could not read record: {}", e);
                false
            }
        }
    }

    async fn finalize(&self, job: &PollJob, result_url: &str) -> PollOutcome {
        let attempts = self.config.finalize_max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.store_artifact(job, result_url).await {
                Ok(true) => return self.record_completion(job).await,
                Ok(false) => {
                    info!(
                        path = %job.source_path,
                        generation = job.generation,
                        "Record taken over during download; artifact discarded"
                    );
                    return PollOutcome::Superseded;
                }
                Err(e) => {
                    metrics::FINALIZE_RETRIES.inc();
                    warn!(
                        path = %job.source_path,
                        attempt,
                        attempts,
                        "Finalize attempt failed: {}",
                        e
                    );
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.config.finalize_retry_delay()).await;
                    }
                }
            }
        }

        let message = format!("{}: {}", FINALIZE_FAILED_PREFIX, last_error);
        self.record_failure(job, message, true)
    }

    /// Download the artifact and write it to the output path.
    /// Returns false, without uploading, when the record changed hands.
    async fn store_artifact(&self, job: &PollJob, result_url: &str) -> Result<bool, String> {
        let bytes = self
            .job_client
            .fetch_result(result_url)
            .await
            .map_err(|e| e.to_string())?;

        if self.is_superseded(job) {
            return Ok(false);
        }

        self.object_store
            .upload(&job.output_path, bytes, content_type_for(&job.output_path))
            .await
            .map_err(|e| e.to_string())?;
        Ok(true)
    }

    async fn record_completion(&self, job: &PollJob) -> PollOutcome {
        match self
            .status_store
            .mark_completed(&job.source_path, job.generation, &job.output_path)
        {
            Ok(Transition::Applied) => {
                info!(
                    path = %job.source_path,
                    output = %job.output_path,
                    "Transcode completed"
                );
                if self.config.delete_source_on_success && job.source_path != job.output_path {
                    if let Err(e) = self.object_store.remove(&job.source_path).await {
                        warn!(path = %job.source_path, "Failed to delete source: {}", e);
                    }
                }
                PollOutcome::Completed {
                    output_path: job.output_path.clone(),
                }
            }
            Ok(transition) => {
                info!(path = %job.source_path, ?transition, "Completion not recorded");
                PollOutcome::Superseded
            }
            Err(e) => {
                error!(path = %job.source_path, "Failed to record completion: {}", e);
                PollOutcome::RecordWriteFailed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn record_failure(&self, job: &PollJob, message: String, finalize: bool) -> PollOutcome {
        match self
            .status_store
            .mark_failed(&job.source_path, job.generation, &message)
        {
            Ok(Transition::Applied) if finalize => PollOutcome::FinalizeFailed { error: message },
            Ok(Transition::Applied) => PollOutcome::Failed { message },
            Ok(transition) => {
                info!(path = %job.source_path, ?transition, "Failure not recorded");
                PollOutcome::Superseded
            }
            Err(e) => {
                error!(path = %job.source_path, "Failed to record failure: {}", e);
                PollOutcome::RecordWriteFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::sync::Notify;

    use crate::job_client::JobClientError;
    use crate::status::{StatusError, TranscodeStatus};
    use crate::storage::StorageError;
    use crate::testing::{fast_config, MockJobClient, MockObjectStore, MockStatusStore};

    struct Fixture {
        poller: Poller,
        job_client: Arc<MockJobClient>,
        status_store: Arc<MockStatusStore>,
        object_store: Arc<MockObjectStore>,
        shutdown_tx: broadcast::Sender<()>,
        job: PollJob,
    }

    fn fixture(config: OrchestratorConfig) -> Fixture {
        let job_client = Arc::new(MockJobClient::new());
        let status_store = Arc::new(MockStatusStore::new());
        let object_store = Arc::new(MockObjectStore::new());
        let record = status_store.mark_processing("raw/abc.mp4", "job-1").unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);

        Fixture {
            poller: Poller::new(
                config,
                job_client.clone(),
                status_store.clone(),
                object_store.clone(),
            ),
            job_client,
            status_store,
            object_store,
            shutdown_tx,
            job: PollJob {
                source_path: "raw/abc.mp4".to_string(),
                job_id: "job-1".to_string(),
                generation: record.generation,
                output_path: "compressed/abc.mp4".to_string(),
            },
        }
    }

    async fn run(f: &Fixture) -> PollOutcome {
        f.poller.run(&f.job, f.shutdown_tx.subscribe()).await
    }

    fn succeeded() -> JobStatus {
        JobStatus::Succeeded {
            result_url: "https://x/out.mp4".to_string(),
        }
    }

    #[tokio::test]
    async fn test_success_writes_artifact_and_completes() {
        let f = fixture(fast_config());
        f.job_client
            .push_poll_results("job-1", vec![Ok(JobStatus::Running), Ok(JobStatus::Running), Ok(succeeded())]);
        f.job_client
            .set_result("https://x/out.mp4", Bytes::from_static(b"compressed"));

        let outcome = run(&f).await;

        assert_eq!(
            outcome,
            PollOutcome::Completed {
                output_path: "compressed/abc.mp4".to_string()
            }
        );
        assert_eq!(f.job_client.poll_count("job-1"), 3);
        assert_eq!(
            f.object_store.object("compressed/abc.mp4").unwrap().as_ref(),
            b"compressed"
        );
        let record = f.status_store.record("raw/abc.mp4").unwrap();
        assert_eq!(record.status, TranscodeStatus::Completed);
        assert_eq!(record.output_path.as_deref(), Some("compressed/abc.mp4"));
        assert!(f.object_store.removed().is_empty());
    }

    #[tokio::test]
    async fn test_success_deletes_source_when_configured() {
        let f = fixture(OrchestratorConfig {
            delete_source_on_success: true,
            ..fast_config()
        });
        f.job_client.push_poll_results("job-1", vec![Ok(succeeded())]);
        f.job_client
            .set_result("https://x/out.mp4", Bytes::from_static(b"compressed"));

        let outcome = run(&f).await;

        assert_eq!(outcome.kind(), "completed");
        assert_eq!(f.object_store.removed(), vec!["raw/abc.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_source_delete_failure_is_not_fatal() {
        let f = fixture(OrchestratorConfig {
            delete_source_on_success: true,
            ..fast_config()
        });
        f.job_client.push_poll_results("job-1", vec![Ok(succeeded())]);
        f.job_client
            .set_result("https://x/out.mp4", Bytes::from_static(b"compressed"));
        f.object_store
            .set_remove_error(StorageError::DeleteFailed("denied".to_string()));

        let outcome = run(&f).await;
        assert_eq!(outcome.kind(), "completed");
    }

    #[tokio::test]
    async fn test_job_failure_is_recorded() {
        let f = fixture(fast_config());
        f.job_client.push_poll_results(
            "job-1",
            vec![Ok(JobStatus::Failed {
                message: "unsupported codec".to_string(),
            })],
        );

        let outcome = run(&f).await;

        assert_eq!(
            outcome,
            PollOutcome::Failed {
                message: "unsupported codec".to_string()
            }
        );
        let record = f.status_store.record("raw/abc.mp4").unwrap();
        assert_eq!(record.status, TranscodeStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("unsupported codec"));
        assert_eq!(f.object_store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_poll_errors_are_retried() {
        let f = fixture(fast_config());
        f.job_client.push_poll_results(
            "job-1",
            vec![
                Err(JobClientError::PollFailed("HTTP 502".to_string())),
                Err(JobClientError::PollFailed("timeout".to_string())),
                Ok(succeeded()),
            ],
        );
        f.job_client
            .set_result("https://x/out.mp4", Bytes::from_static(b"ok"));

        let outcome = run(&f).await;
        assert_eq!(outcome.kind(), "completed");
    }

    #[tokio::test]
    async fn test_timeout_leaves_record_processing() {
        let f = fixture(OrchestratorConfig {
            poll_interval_ms: 10,
            timeout_secs: 1,
            ..fast_config()
        });
        // No scripted results: the mock reports Running forever.

        let outcome = run(&f).await;

        assert_eq!(outcome, PollOutcome::TimedOut);
        let record = f.status_store.record("raw/abc.mp4").unwrap();
        assert_eq!(record.status, TranscodeStatus::Processing);
        assert!(record.output_path.is_none());
        assert!(record.error_message.is_none());
        assert!(f.job_client.poll_count("job-1") > 1);
    }

    #[tokio::test]
    async fn test_finalize_retries_then_fails_with_distinct_message() {
        let f = fixture(OrchestratorConfig {
            finalize_max_attempts: 3,
            ..fast_config()
        });
        f.job_client.push_poll_results("job-1", vec![Ok(succeeded())]);
        // No result registered: every download fails.

        let outcome = run(&f).await;

        match outcome {
            PollOutcome::FinalizeFailed { error } => {
                assert!(error.starts_with(FINALIZE_FAILED_PREFIX));
            }
            other => panic!("expected finalize failure, got {other:?}"),
        }
        assert_eq!(f.job_client.fetch_count(), 3);
        let record = f.status_store.record("raw/abc.mp4").unwrap();
        assert_eq!(record.status, TranscodeStatus::Failed);
        assert!(record
            .error_message
            .unwrap()
            .starts_with(FINALIZE_FAILED_PREFIX));
    }

    #[tokio::test]
    async fn test_finalize_recovers_after_upload_failure() {
        let f = fixture(fast_config());
        f.job_client.push_poll_results("job-1", vec![Ok(succeeded())]);
        f.job_client
            .set_result("https://x/out.mp4", Bytes::from_static(b"ok"));
        f.object_store
            .set_next_upload_error(StorageError::UploadFailed("503".to_string()));

        let outcome = run(&f).await;

        assert_eq!(outcome.kind(), "completed");
        assert_eq!(f.job_client.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_superseded_generation_stops_without_writing() {
        let f = fixture(fast_config());
        // A second upload attached a new job before our first poll.
        f.status_store.mark_processing("raw/abc.mp4", "job-2").unwrap();
        f.job_client.push_poll_results("job-1", vec![Ok(succeeded())]);

        let outcome = run(&f).await;

        assert_eq!(outcome, PollOutcome::Superseded);
        assert_eq!(f.job_client.poll_count("job-1"), 0);
        let record = f.status_store.record("raw/abc.mp4").unwrap();
        assert_eq!(record.status, TranscodeStatus::Processing);
        assert_eq!(record.job_id.as_deref(), Some("job-2"));
    }

    /// Job client whose download blocks until `gate` is notified.
    struct GatedJobClient {
        started: Arc<Notify>,
        gate: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl JobClient for GatedJobClient {
        fn name(&self) -> &str {
            "gated"
        }

        async fn submit(
            &self,
            _request: &crate::job_client::SubmitJobRequest,
        ) -> Result<crate::job_client::JobHandle, JobClientError> {
            Err(JobClientError::SubmissionFailed {
                status: Some(500),
                body: "not used".to_string(),
            })
        }

        async fn poll(&self, _job_id: &str) -> Result<JobStatus, JobClientError> {
            Ok(succeeded())
        }

        async fn fetch_result(&self, _result_url: &str) -> Result<Bytes, JobClientError> {
            self.started.notify_one();
            self.gate.notified().await;
            Ok(Bytes::from_static(b"old-artifact"))
        }
    }

    #[tokio::test]
    async fn test_newer_generation_during_download_keeps_its_artifact() {
        let status_store = Arc::new(MockStatusStore::new());
        let object_store = Arc::new(MockObjectStore::new());
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let first = status_store.mark_processing("raw/abc.mp4", "job-1").unwrap();
        let poller = Poller::new(
            fast_config(),
            Arc::new(GatedJobClient {
                started: started.clone(),
                gate: gate.clone(),
            }),
            status_store.clone(),
            object_store.clone(),
        );
        let job = PollJob {
            source_path: "raw/abc.mp4".to_string(),
            job_id: "job-1".to_string(),
            generation: first.generation,
            output_path: "compressed/abc.mp4".to_string(),
        };
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let running = tokio::spawn(async move { poller.run(&job, shutdown_rx).await });

        // job-1's download is in flight
        started.notified().await;

        // job-2 finishes while job-1 is still downloading
        let second = status_store.mark_processing("raw/abc.mp4", "job-2").unwrap();
        object_store
            .upload("compressed/abc.mp4", Bytes::from_static(b"new-artifact"), "video/mp4")
            .await
            .unwrap();
        status_store
            .mark_completed("raw/abc.mp4", second.generation, "compressed/abc.mp4")
            .unwrap();
        gate.notify_one();

        let outcome = running.await.unwrap();

        assert_eq!(outcome, PollOutcome::Superseded);
        assert_eq!(
            object_store.object("compressed/abc.mp4").unwrap().as_ref(),
            b"new-artifact"
        );
        let record = status_store.record("raw/abc.mp4").unwrap();
        assert_eq!(record.job_id.as_deref(), Some("job-2"));
        assert_eq!(record.status, TranscodeStatus::Completed);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_poller() {
        let f = fixture(OrchestratorConfig {
            poll_interval_ms: 60_000,
            timeout_secs: 120,
            ..fast_config()
        });
        let rx = f.shutdown_tx.subscribe();
        let tx = f.shutdown_tx.clone();

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let _ = tx.send(());
        });

        let outcome = f.poller.run(&f.job, rx).await;
        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(
            f.status_store.record("raw/abc.mp4").unwrap().status,
            TranscodeStatus::Processing
        );
    }

    #[tokio::test]
    async fn test_terminal_write_failure_is_reported() {
        let f = fixture(fast_config());
        f.job_client.push_poll_results(
            "job-1",
            vec![Ok(JobStatus::Failed {
                message: "bad input".to_string(),
            })],
        );
        f.status_store
            .fail_next("mark_failed", StatusError::Database("locked".to_string()));

        let outcome = run(&f).await;
        assert_eq!(outcome.kind(), "record_write_failed");
    }
}
