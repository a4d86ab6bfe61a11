//! Transcode orchestrator implementation.
//!
//! Owns the collaborators and supervises detached pollers:
//! - Trigger: synchronous, per event (submit + mark processing)
//! - Pollers: one tokio task per job, independent of the request
//! - Reconciliation: recovery on start plus a periodic stale sweep

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::job_client::JobClient;
use crate::metrics;
use crate::status::{StatusError, StatusFilter, StatusStore, TranscodeStatus};
use crate::storage::ObjectStore;

use super::config::OrchestratorConfig;
use super::poller::Poller;
use super::reconcile::{all_processing, reconcile, stale_processing};
use super::trigger::TriggerHandler;
use super::types::{
    ActiveJob, ObjectCreatedEvent, OrchestratorStatus, PollJob, ReconcileReport, TriggerError,
    TriggerOutcome,
};

/// How long `stop()` waits for pollers to exit.
const STOP_GRACE: Duration = Duration::from_secs(2);

type ActiveJobs = Arc<RwLock<HashMap<String, ActiveJob>>>;

/// Spawns pollers as detached tasks and tracks which jobs they own.
#[derive(Clone)]
pub(super) struct Supervisor {
    poller: Arc<Poller>,
    active: ActiveJobs,
    shutdown_tx: broadcast::Sender<()>,
    // Set by stop() before it takes the `active` lock, so a poller either
    // subscribes before the shutdown message or is never spawned.
    halted: Arc<AtomicBool>,
}

impl Supervisor {
    /// Whether a poller here already tracks this generation (or a newer one).
    pub(super) async fn is_tracking(&self, source_path: &str, generation: u64) -> bool {
        self.active
            .read()
            .await
            .get(source_path)
            .is_some_and(|job| job.generation >= generation)
    }

    /// Stop accepting pollers and signal the running ones to exit.
    async fn halt(&self) {
        self.halted.store(true, Ordering::SeqCst);
        drop(self.active.write().await);
        let _ = self.shutdown_tx.send(());
    }

    fn resume(&self) {
        self.halted.store(false, Ordering::SeqCst);
    }

    /// Spawn a poller unless the job is already tracked or the
    /// orchestrator has been stopped.
    pub(super) async fn spawn(&self, job: PollJob) -> bool {
        let shutdown_rx = {
            let mut active = self.active.write().await;
            if self.halted.load(Ordering::SeqCst) {
                info!(
                    path = %job.source_path,
                    job_id = %job.job_id,
                    "Orchestrator stopped; job left processing for recovery"
                );
                return false;
            }
            if active
                .get(&job.source_path)
                .is_some_and(|existing| existing.generation >= job.generation)
            {
                debug!(path = %job.source_path, "Job already tracked");
                return false;
            }
            active.insert(
                job.source_path.clone(),
                ActiveJob {
                    source_path: job.source_path.clone(),
                    job_id: job.job_id.clone(),
                    generation: job.generation,
                    started_at: Utc::now(),
                },
            );
            self.shutdown_tx.subscribe()
        };

        let poller = Arc::clone(&self.poller);
        let active = Arc::clone(&self.active);
        metrics::ACTIVE_POLLERS.inc();

        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = poller.run(&job, shutdown_rx).await;

            metrics::ACTIVE_POLLERS.dec();
            metrics::JOB_OUTCOMES
                .with_label_values(&[outcome.kind()])
                .inc();
            metrics::JOB_DURATION
                .with_label_values(&[outcome.kind()])
                .observe(started.elapsed().as_secs_f64());

            {
                let mut active = active.write().await;
                if active
                    .get(&job.source_path)
                    .is_some_and(|tracked| tracked.generation == job.generation)
                {
                    active.remove(&job.source_path);
                }
            }

            info!(
                path = %job.source_path,
                job_id = %job.job_id,
                outcome = outcome.kind(),
                "Poller finished"
            );
        });

        true
    }
}

/// The transcode orchestrator - accepts events and drives jobs to a terminal state.
pub struct TranscodeOrchestrator {
    config: OrchestratorConfig,
    trigger: TriggerHandler,
    status_store: Arc<dyn StatusStore>,
    supervisor: Supervisor,

    // Runtime state
    running: Arc<AtomicBool>,
}

impl TranscodeOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        job_client: Arc<dyn JobClient>,
        status_store: Arc<dyn StatusStore>,
        object_store: Arc<dyn ObjectStore>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let trigger = TriggerHandler::new(
            config.clone(),
            Arc::clone(&job_client),
            Arc::clone(&status_store),
            Arc::clone(&object_store),
        );
        let poller = Poller::new(
            config.clone(),
            job_client,
            Arc::clone(&status_store),
            object_store,
        );

        Self {
            config,
            trigger,
            status_store,
            supervisor: Supervisor {
                poller: Arc::new(poller),
                active: Arc::new(RwLock::new(HashMap::new())),
                shutdown_tx,
                halted: Arc::new(AtomicBool::new(false)),
            },
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the orchestrator: recover unfinished jobs and start the sweep.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator already running");
            return;
        }

        info!("Starting transcode orchestrator");
        self.supervisor.resume();

        // Re-attach jobs that were being polled when we last shut down
        match reconcile(
            &self.status_store,
            &self.supervisor,
            &self.config,
            &all_processing(),
        )
        .await
        {
            Ok(report) if report.reattached + report.abandoned > 0 => info!(
                reattached = report.reattached,
                abandoned = report.abandoned,
                "Recovered processing jobs"
            ),
            Ok(_) => {}
            Err(e) => warn!("Failed to recover processing jobs: {}", e),
        }

        if self.config.reconcile.enabled {
            self.spawn_reconcile_loop();
        }

        info!("Transcode orchestrator started");
    }

    /// Stop the orchestrator. Running pollers exit and leave their records
    /// `processing` for the next start.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping transcode orchestrator");

        // Signal shutdown to the sweep and all pollers
        self.supervisor.halt().await;

        let deadline = Instant::now() + STOP_GRACE;
        while Instant::now() < deadline && !self.supervisor.active.read().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        info!("Transcode orchestrator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let active_jobs = self.supervisor.active.read().await.len();

        let count = |status| {
            self.status_store
                .count(&StatusFilter::new().with_status(status))
                .unwrap_or(0) as usize
        };

        OrchestratorStatus {
            running: self.is_running(),
            active_jobs,
            processing_count: count(TranscodeStatus::Processing),
            completed_count: count(TranscodeStatus::Completed),
            failed_count: count(TranscodeStatus::Failed),
        }
    }

    /// Jobs currently tracked by pollers in this process.
    pub async fn active_jobs(&self) -> Vec<ActiveJob> {
        let mut jobs: Vec<_> = self.supervisor.active.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }

    /// Handle an object-created event. Accepted jobs are handed to a
    /// detached poller before this returns; no polling happens here.
    ///
    /// After `stop()` the job is still submitted and recorded, but no poller
    /// is spawned; recovery on the next `start()` picks it up.
    pub async fn handle_event(
        &self,
        event: &ObjectCreatedEvent,
    ) -> Result<TriggerOutcome, TriggerError> {
        let outcome = self.trigger.handle(event).await?;
        if let TriggerOutcome::Accepted(ref job) = outcome {
            self.spawn_poller(job.clone()).await;
        }
        Ok(outcome)
    }

    /// Spawn a detached poller for a submitted job.
    /// Returns false if this generation is already being polled or the
    /// orchestrator has been stopped.
    pub async fn spawn_poller(&self, job: PollJob) -> bool {
        self.supervisor.spawn(job).await
    }

    /// Run one stale-record sweep now.
    pub async fn reconcile_once(&self) -> Result<ReconcileReport, StatusError> {
        reconcile(
            &self.status_store,
            &self.supervisor,
            &self.config,
            &stale_processing(&self.config),
        )
        .await
    }

    /// Spawn the periodic reconciliation task.
    fn spawn_reconcile_loop(&self) {
        let running = Arc::clone(&self.running);
        let status_store = Arc::clone(&self.status_store);
        let supervisor = self.supervisor.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.supervisor.shutdown_tx.subscribe();
        let interval = Duration::from_secs(config.reconcile.interval_secs.max(1));

        tokio::spawn(async move {
            info!("Reconciliation loop started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Reconciliation loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let filter = stale_processing(&config);
                        match reconcile(&status_store, &supervisor, &config, &filter).await {
                            Ok(report) if report.reattached + report.abandoned > 0 => info!(
                                reattached = report.reattached,
                                abandoned = report.abandoned,
                                "Reconciliation sweep finished"
                            ),
                            Ok(_) => debug!("Reconciliation sweep found nothing stale"),
                            Err(e) => warn!("Reconciliation sweep failed: {}", e),
                        }
                    }
                }
            }
            info!("Reconciliation loop stopped");
        });
    }
}
