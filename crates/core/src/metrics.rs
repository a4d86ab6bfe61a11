//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Trigger handling (submissions, ignored events)
//! - Pollers (poll errors, finalize retries, outcomes, durations)
//! - Reconciliation sweeps

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Trigger Metrics
// =============================================================================

/// Jobs accepted by the transcoding service.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidrelay_jobs_submitted_total",
        "Total transcode jobs submitted",
    )
    .unwrap()
});

/// Trigger failures by error kind.
pub static TRIGGER_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidrelay_trigger_failures_total",
            "Object-created events that failed before a job was tracked",
        ),
        &["kind"], // "resolution_failed", "submission_failed", "store_failed"
    )
    .unwrap()
});

/// Ignored events by reason.
pub static EVENTS_IGNORED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidrelay_events_ignored_total",
            "Object-created events ignored without side effects",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Poller Metrics
// =============================================================================

/// Pollers currently running in this process.
pub static ACTIVE_POLLERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("vidrelay_active_pollers", "Pollers currently tracking a job").unwrap()
});

/// Transient status request failures.
pub static POLL_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidrelay_poll_errors_total",
        "Job status requests that failed and were retried",
    )
    .unwrap()
});

/// Finalize attempts that failed and were retried or abandoned.
pub static FINALIZE_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidrelay_finalize_retries_total",
        "Failed download/upload attempts after a successful transcode",
    )
    .unwrap()
});

/// Poller outcomes.
pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidrelay_job_outcomes_total", "Poller outcomes by kind"),
        &["outcome"],
    )
    .unwrap()
});

/// Time from poller start to outcome.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidrelay_job_duration_seconds",
            "Time a poller spent tracking a job",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 180.0, 240.0, 400.0, 900.0]),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Reconciliation Metrics
// =============================================================================

/// Records handled by reconciliation sweeps.
pub static RECONCILED_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vidrelay_reconciled_jobs_total",
            "Processing records handled by reconciliation",
        ),
        &["action"], // "reattached", "abandoned"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Trigger
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(TRIGGER_FAILURES.clone()),
        Box::new(EVENTS_IGNORED.clone()),
        // Poller
        Box::new(ACTIVE_POLLERS.clone()),
        Box::new(POLL_ERRORS.clone()),
        Box::new(FINALIZE_RETRIES.clone()),
        Box::new(JOB_OUTCOMES.clone()),
        Box::new(JOB_DURATION.clone()),
        // Reconciliation
        Box::new(RECONCILED_JOBS.clone()),
    ]
}
