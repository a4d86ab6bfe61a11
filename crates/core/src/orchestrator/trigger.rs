//! Entry point for object-created events.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::job_client::{JobClient, SubmitJobRequest};
use crate::metrics;
use crate::status::{StatusError, StatusStore};
use crate::storage::ObjectStore;

use super::config::OrchestratorConfig;
use super::paths::{derived_output_path, file_name, has_extension, is_under_prefix};
use super::types::{IgnoreReason, ObjectCreatedEvent, PollJob, TriggerError, TriggerOutcome};

/// Validates an event, submits the job and records it as `processing`.
///
/// Does not wait on the job; the returned `PollJob` is handed to a poller.
pub struct TriggerHandler {
    config: OrchestratorConfig,
    job_client: Arc<dyn JobClient>,
    status_store: Arc<dyn StatusStore>,
    object_store: Arc<dyn ObjectStore>,
}

impl TriggerHandler {
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

    /// Filters that need no I/O.
    fn filter(&self, event: &ObjectCreatedEvent) -> Option<IgnoreReason> {
        if !has_extension(&event.name, &self.config.source_extension) {
            return Some(IgnoreReason::WrongExtension);
        }
        if let Some(ref bucket) = self.config.watch_bucket {
            if bucket != &event.bucket_id {
                return Some(IgnoreReason::OtherBucket);
            }
        }
        if is_under_prefix(&event.name, &self.config.output_prefix) {
            return Some(IgnoreReason::OutputObject);
        }
        None
    }

    fn ignored(event: &ObjectCreatedEvent, reason: IgnoreReason) -> TriggerOutcome {
        debug!(
            bucket = %event.bucket_id,
            path = %event.name,
            reason = reason.as_str(),
            "Ignoring object-created event"
        );
        metrics::EVENTS_IGNORED
            .with_label_values(&[reason.as_str()])
            .inc();
        TriggerOutcome::Ignored(reason)
    }

    /// Handle one event.
    pub async fn handle(&self, event: &ObjectCreatedEvent) -> Result<TriggerOutcome, TriggerError> {
        if let Some(reason) = self.filter(event) {
            return Ok(Self::ignored(event, reason));
        }

        let result = self.submit(event).await;
        if let Err(ref e) = result {
            warn!(path = %event.name, kind = e.kind(), "Trigger failed: {}", e);
            metrics::TRIGGER_FAILURES.with_label_values(&[e.kind()]).inc();
        }
        result
    }

    async fn submit(&self, event: &ObjectCreatedEvent) -> Result<TriggerOutcome, TriggerError> {
        let source_path = event.name.as_str();

        if let Some(existing) = self.status_store.get(source_path)? {
            if existing.status.is_terminal() {
                return Ok(Self::ignored(event, IgnoreReason::AlreadyTerminal));
            }
        }

        let source_url = self
            .object_store
            .public_url(source_path)
            .map_err(TriggerError::ResolutionFailed)?;

        let output_path = derived_output_path(source_path, &self.config.output_prefix);
        let request = SubmitJobRequest::new(source_url, file_name(&output_path));

        let handle = self
            .job_client
            .submit(&request)
            .await
            .map_err(TriggerError::SubmissionFailed)?;
        metrics::JOBS_SUBMITTED.inc();

        let record = match self.status_store.mark_processing(source_path, &handle.job_id) {
            Ok(record) => record,
            Err(StatusError::AlreadyTerminal(_)) => {
                // Finished between the check above and now; the new job is orphaned.
                warn!(
                    path = %source_path,
                    job_id = %handle.job_id,
                    "Record became terminal while submitting; not tracking job"
                );
                return Ok(Self::ignored(event, IgnoreReason::AlreadyTerminal));
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            path = %source_path,
            job_id = %handle.job_id,
            generation = record.generation,
            client = self.job_client.name(),
            "Transcode job submitted"
        );

        Ok(TriggerOutcome::Accepted(PollJob {
            source_path: source_path.to_string(),
            job_id: handle.job_id,
            generation: record.generation,
            output_path,
        }))
    }
}
