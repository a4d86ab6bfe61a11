//! Re-attaching pollers to `processing` records nobody is tracking.
//!
//! A poller that runs out of budget, or a process that restarts, leaves
//! records in `processing`. The sweep gives such records a fresh poller,
//! or marks them failed once their current job is older than the give-up
//! age.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::metrics;
use crate::status::{StatusError, StatusFilter, StatusStore, TranscodeStatus, Transition};

use super::config::OrchestratorConfig;
use super::paths::derived_output_path;
use super::runner::Supervisor;
use super::types::{PollJob, ReconcileReport};

/// Filter for every `processing` record (recovery on start).
pub(super) fn all_processing() -> StatusFilter {
    StatusFilter::new()
        .with_status(TranscodeStatus::Processing)
        .with_limit(i64::MAX)
}

/// Filter for stale `processing` records (periodic sweep).
pub(super) fn stale_processing(config: &OrchestratorConfig) -> StatusFilter {
    let stale_after = Duration::seconds(config.reconcile.stale_after_secs as i64);
    StatusFilter::new()
        .with_status(TranscodeStatus::Processing)
        .with_updated_before(Utc::now() - stale_after)
        .with_limit(config.reconcile.batch_limit)
}

/// Reconcile every record matched by `filter`.
pub(super) async fn reconcile(
    status_store: &Arc<dyn StatusStore>,
    supervisor: &Supervisor,
    config: &OrchestratorConfig,
    filter: &StatusFilter,
) -> Result<ReconcileReport, StatusError> {
    let records = status_store.list(filter)?;
    let give_up_before =
        Utc::now() - Duration::seconds(config.reconcile.give_up_after_secs as i64);
    let mut report = ReconcileReport::default();

    for record in records {
        if supervisor
            .is_tracking(&record.source_path, record.generation)
            .await
        {
            report.skipped += 1;
            continue;
        }

        let job_id = match record.job_id.clone() {
            Some(job_id) if record.submitted_at >= give_up_before => job_id,
            job_id => {
                let message = if job_id.is_none() {
                    "reconciliation gave up: no job id recorded".to_string()
                } else {
                    format!(
                        "reconciliation gave up: no terminal job status after {}s",
                        config.reconcile.give_up_after_secs
                    )
                };
                match status_store.mark_failed(&record.source_path, record.generation, &message) {
                    Ok(Transition::Applied) => {
                        warn!(path = %record.source_path, "{}", message);
                        metrics::RECONCILED_JOBS
                            .with_label_values(&["abandoned"])
                            .inc();
                        report.abandoned += 1;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(path = %record.source_path, "Failed to abandon record: {}", e),
                }
                continue;
            }
        };

        match status_store.refresh_claim(&record.source_path, record.generation) {
            Ok(true) => {}
            Ok(false) => continue,
            Err(e) => {
                warn!(path = %record.source_path, "Failed to claim record: {}", e);
                continue;
            }
        }

        let job = PollJob {
            output_path: derived_output_path(&record.source_path, &config.output_prefix),
            source_path: record.source_path,
            job_id,
            generation: record.generation,
        };

        info!(path = %job.source_path, job_id = %job.job_id, "Re-attaching poller");
        if supervisor.spawn(job).await {
            metrics::RECONCILED_JOBS
                .with_label_values(&["reattached"])
                .inc();
            report.reattached += 1;
        } else {
            report.skipped += 1;
        }
    }

    Ok(report)
}
