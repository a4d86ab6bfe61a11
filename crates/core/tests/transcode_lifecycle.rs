//! Transcode lifecycle integration tests.
//!
//! Drive events through the orchestrator against a real SQLite status store:
//! processing -> completed | failed, plus timeouts, superseded generations
//! and recovery after a restart.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;
use tokio::sync::broadcast;

use vidrelay_core::{
    orchestrator::{Poller, PollJob, FINALIZE_FAILED_PREFIX},
    testing::{fast_config, MockJobClient, MockObjectStore},
    JobClient, JobClientError, JobStatus, ObjectCreatedEvent, ObjectStore, OrchestratorConfig,
    PollOutcome, SqliteStatusStore, StatusStore, TranscodeOrchestrator, TranscodeRecord,
    TranscodeStatus, TriggerOutcome,
};

const RESULT_URL: &str = "https://jobs.test/results/abc.mp4";

/// Test helper holding the store and mocks shared by orchestrator instances.
struct TestHarness {
    status_store: Arc<SqliteStatusStore>,
    job_client: Arc<MockJobClient>,
    object_store: Arc<MockObjectStore>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        Self {
            status_store: Arc::new(
                SqliteStatusStore::new(&db_path).expect("Failed to create status store"),
            ),
            job_client: Arc::new(MockJobClient::new()),
            object_store: Arc::new(MockObjectStore::new()),
            _temp_dir: temp_dir,
        }
    }

    fn orchestrator(&self, config: OrchestratorConfig) -> TranscodeOrchestrator {
        TranscodeOrchestrator::new(
            config,
            Arc::clone(&self.job_client) as Arc<dyn JobClient>,
            Arc::clone(&self.status_store) as Arc<dyn StatusStore>,
            Arc::clone(&self.object_store) as Arc<dyn ObjectStore>,
        )
    }

    fn poller(&self, config: OrchestratorConfig) -> Poller {
        Poller::new(
            config,
            Arc::clone(&self.job_client) as Arc<dyn JobClient>,
            Arc::clone(&self.status_store) as Arc<dyn StatusStore>,
            Arc::clone(&self.object_store) as Arc<dyn ObjectStore>,
        )
    }

    fn succeed_with(&self, job_id: &str, running_polls: usize) {
        let mut script: Vec<Result<JobStatus, JobClientError>> =
            (0..running_polls).map(|_| Ok(JobStatus::Running)).collect();
        script.push(Ok(JobStatus::Succeeded {
            result_url: RESULT_URL.to_string(),
        }));
        self.job_client.push_poll_results(job_id, script);
        self.job_client
            .set_result(RESULT_URL, Bytes::from_static(b"compressed-bytes"));
    }

    async fn wait_for_status(&self, source_path: &str, status: TranscodeStatus) -> TranscodeRecord {
        for _ in 0..300 {
            if let Ok(Some(record)) = self.status_store.get(source_path) {
                if record.status == status {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reached {:?}", source_path, status);
    }
}

fn event(name: &str) -> ObjectCreatedEvent {
    ObjectCreatedEvent::new("media", name)
}

fn accepted(outcome: TriggerOutcome) -> PollJob {
    match outcome {
        TriggerOutcome::Accepted(job) => job,
        other => panic!("expected Accepted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_upload_to_completed() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(fast_config());
    harness.job_client.set_next_job_id("job-1");
    harness.succeed_with("job-1", 2);

    let job = accepted(orchestrator.handle_event(&event("raw/abc.mp4")).await.unwrap());
    assert_eq!(job.job_id, "job-1");
    assert_eq!(job.output_path, "compressed/abc.mp4");

    // The trigger returned with the record already processing
    let record = harness.status_store.get("raw/abc.mp4").unwrap().unwrap();
    assert!(matches!(
        record.status,
        TranscodeStatus::Processing | TranscodeStatus::Completed
    ));
    assert_eq!(record.job_id.as_deref(), Some("job-1"));

    let record = harness
        .wait_for_status("raw/abc.mp4", TranscodeStatus::Completed)
        .await;
    assert_eq!(record.output_path.as_deref(), Some("compressed/abc.mp4"));
    assert_eq!(record.error_message, None);
    assert_eq!(
        harness.object_store.object("compressed/abc.mp4"),
        Some(Bytes::from_static(b"compressed-bytes"))
    );
    assert_eq!(harness.job_client.poll_count("job-1"), 3);
    // Source is kept unless deletion is enabled
    assert!(harness.object_store.removed().is_empty());
}

#[tokio::test]
async fn test_completed_job_deletes_source_when_enabled() {
    let harness = TestHarness::new();
    let mut config = fast_config();
    config.delete_source_on_success = true;
    let orchestrator = harness.orchestrator(config);
    harness.job_client.set_next_job_id("job-1");
    harness.succeed_with("job-1", 0);

    orchestrator
        .handle_event(&event("raw/abc.mp4"))
        .await
        .unwrap();
    harness
        .wait_for_status("raw/abc.mp4", TranscodeStatus::Completed)
        .await;

    // Removal happens right after the terminal write
    for _ in 0..100 {
        if !harness.object_store.removed().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(harness.object_store.removed(), vec!["raw/abc.mp4".to_string()]);
}

#[tokio::test]
async fn test_service_failure_marks_failed() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(fast_config());
    harness.job_client.set_next_job_id("job-err");
    harness.job_client.push_poll_results(
        "job-err",
        vec![
            Ok(JobStatus::Running),
            Err(JobClientError::PollFailed("connection reset".to_string())),
            Ok(JobStatus::Failed {
                message: "invalid input stream".to_string(),
            }),
        ],
    );

    orchestrator
        .handle_event(&event("raw/broken.mp4"))
        .await
        .unwrap();

    let record = harness
        .wait_for_status("raw/broken.mp4", TranscodeStatus::Failed)
        .await;
    assert_eq!(record.error_message.as_deref(), Some("invalid input stream"));
    assert_eq!(record.output_path, None);
    assert!(harness.object_store.paths().is_empty());
    assert_eq!(harness.job_client.fetch_count(), 0);
}

#[tokio::test]
async fn test_timeout_leaves_record_processing() {
    let harness = TestHarness::new();
    let mut config = fast_config();
    config.timeout_secs = 1;
    config.poll_interval_ms = 100;
    let poller = harness.poller(config);

    let record = harness
        .status_store
        .mark_processing("raw/slow.mp4", "job-slow")
        .unwrap();
    let job = PollJob {
        source_path: "raw/slow.mp4".to_string(),
        job_id: "job-slow".to_string(),
        generation: record.generation,
        output_path: "compressed/slow.mp4".to_string(),
    };

    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let outcome = poller.run(&job, shutdown_rx).await;

    assert_eq!(outcome, PollOutcome::TimedOut);
    assert!(harness.job_client.poll_count("job-slow") <= 10);
    let record = harness.status_store.get("raw/slow.mp4").unwrap().unwrap();
    assert_eq!(record.status, TranscodeStatus::Processing);
}

#[tokio::test]
async fn test_finalize_failure_marks_failed_after_retries() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(fast_config());
    harness.job_client.set_next_job_id("job-1");
    // Succeeds, but the result URL is never downloadable
    harness.job_client.push_poll_results(
        "job-1",
        vec![Ok(JobStatus::Succeeded {
            result_url: "https://jobs.test/results/missing.mp4".to_string(),
        })],
    );

    orchestrator
        .handle_event(&event("raw/abc.mp4"))
        .await
        .unwrap();

    let record = harness
        .wait_for_status("raw/abc.mp4", TranscodeStatus::Failed)
        .await;
    assert!(record
        .error_message
        .unwrap()
        .starts_with(FINALIZE_FAILED_PREFIX));
    assert_eq!(harness.job_client.fetch_count(), 3);
    assert!(harness.object_store.paths().is_empty());
}

#[tokio::test]
async fn test_newer_upload_supersedes_running_poller() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(fast_config());

    harness.job_client.set_next_job_id("job-1");
    let first = accepted(orchestrator.handle_event(&event("raw/abc.mp4")).await.unwrap());
    assert_eq!(first.generation, 1);

    // Same path uploaded again while job-1 is still running
    harness.job_client.set_next_job_id("job-2");
    harness.succeed_with("job-2", 1);
    let second = accepted(orchestrator.handle_event(&event("raw/abc.mp4")).await.unwrap());
    assert_eq!(second.generation, 2);

    let record = harness
        .wait_for_status("raw/abc.mp4", TranscodeStatus::Completed)
        .await;
    assert_eq!(record.job_id.as_deref(), Some("job-2"));
    assert_eq!(record.generation, 2);

    // job-1's poller gives up once it sees the newer generation
    for _ in 0..100 {
        if orchestrator.active_jobs().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(orchestrator.active_jobs().await.is_empty());
}

#[tokio::test]
async fn test_stale_generation_cannot_complete() {
    let harness = TestHarness::new();
    let poller = harness.poller(fast_config());
    harness.succeed_with("job-1", 0);

    let record = harness
        .status_store
        .mark_processing("raw/abc.mp4", "job-1")
        .unwrap();
    harness
        .status_store
        .mark_processing("raw/abc.mp4", "job-2")
        .unwrap();

    let job = PollJob {
        source_path: "raw/abc.mp4".to_string(),
        job_id: "job-1".to_string(),
        generation: record.generation,
        output_path: "compressed/abc.mp4".to_string(),
    };
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

    assert_eq!(poller.run(&job, shutdown_rx).await, PollOutcome::Superseded);
    let record = harness.status_store.get("raw/abc.mp4").unwrap().unwrap();
    assert_eq!(record.status, TranscodeStatus::Processing);
    assert_eq!(record.job_id.as_deref(), Some("job-2"));
    assert_eq!(harness.job_client.poll_count("job-1"), 0);
}

#[tokio::test]
async fn test_stop_leaves_records_processing_and_restart_recovers() {
    let harness = TestHarness::new();

    let first = harness.orchestrator(fast_config());
    first.start().await;
    harness.job_client.set_next_job_id("job-1");
    first
        .handle_event(&event("raw/abc.mp4"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    first.stop().await;
    assert!(first.active_jobs().await.is_empty());
    let record = harness.status_store.get("raw/abc.mp4").unwrap().unwrap();
    assert_eq!(record.status, TranscodeStatus::Processing);

    // The job finishes while nobody is watching; a fresh process picks it up
    harness.succeed_with("job-1", 0);
    let second = harness.orchestrator(fast_config());
    second.start().await;

    let record = harness
        .wait_for_status("raw/abc.mp4", TranscodeStatus::Completed)
        .await;
    assert_eq!(record.generation, 1);
    assert_eq!(
        harness.object_store.object("compressed/abc.mp4"),
        Some(Bytes::from_static(b"compressed-bytes"))
    );

    second.stop().await;
}

#[tokio::test]
async fn test_restart_keeps_resubmitted_job_of_old_record() {
    let harness = TestHarness::new();
    harness
        .status_store
        .mark_processing("raw/abc.mp4", "job-old")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // A re-upload attaches a new job to the long-lived record
    let record = harness
        .status_store
        .mark_processing("raw/abc.mp4", "job-new")
        .unwrap();
    assert_eq!(record.generation, 2);

    let mut config = fast_config();
    config.reconcile.give_up_after_secs = 1;
    let orchestrator = harness.orchestrator(config);
    orchestrator.start().await;

    let record = harness.status_store.get("raw/abc.mp4").unwrap().unwrap();
    assert_eq!(record.status, TranscodeStatus::Processing);
    assert_eq!(record.job_id.as_deref(), Some("job-new"));
    assert!(record.error_message.is_none());
    assert_eq!(orchestrator.active_jobs().await.len(), 1);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_duplicate_event_after_completion_is_ignored() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(fast_config());
    harness.job_client.set_next_job_id("job-1");
    harness.succeed_with("job-1", 0);

    orchestrator
        .handle_event(&event("raw/abc.mp4"))
        .await
        .unwrap();
    harness
        .wait_for_status("raw/abc.mp4", TranscodeStatus::Completed)
        .await;

    let outcome = orchestrator
        .handle_event(&event("raw/abc.mp4"))
        .await
        .unwrap();

    assert!(matches!(outcome, TriggerOutcome::Ignored(_)));
    assert_eq!(harness.job_client.recorded_submissions().len(), 1);
}
