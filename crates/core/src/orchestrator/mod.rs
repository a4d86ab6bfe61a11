//! Transcode orchestrator.
//!
//! Turns object-created events into tracked transcode jobs:
//! - **Trigger**: synchronous per event; submits the job and marks the record `processing`
//! - **Poller**: one detached task per job; polls until terminal or out of budget
//! - **Reconciliation**: re-attaches pollers to records nobody is tracking

mod config;
pub mod paths;
mod poller;
mod reconcile;
mod runner;
mod trigger;
mod types;

pub use config::{OrchestratorConfig, ReconcileConfig};
pub use poller::{Poller, FINALIZE_FAILED_PREFIX};
pub use runner::TranscodeOrchestrator;
pub use trigger::TriggerHandler;
pub use types::{
    ActiveJob, IgnoreReason, ObjectCreatedEvent, OrchestratorStatus, PollJob, PollOutcome,
    ReconcileReport, TriggerError, TriggerOutcome,
};
