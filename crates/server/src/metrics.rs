//! Prometheus metrics for the HTTP surface.
//!
//! The registry holds the request metrics defined here plus every
//! orchestrator metric from `vidrelay_core::metrics`, and is served as
//! text at `GET /metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    self, core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidrelay_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidrelay_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vidrelay_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Orchestrator Metrics (collected dynamically)
// =============================================================================

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vidrelay_orchestrator_running",
        "Whether the orchestrator is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Records currently `processing` in the status store.
pub static PROCESSING_RECORDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vidrelay_processing_records",
        "Status records currently in the processing state",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register(registry: &Registry, metric: Box<dyn Collector>) {
    if let Err(e) = registry.register(metric) {
        warn!("Failed to register metric: {}", e);
    }
}

fn register_metrics(registry: &Registry) {
    // HTTP
    register(registry, Box::new(HTTP_REQUEST_DURATION.clone()));
    register(registry, Box::new(HTTP_REQUESTS_TOTAL.clone()));
    register(registry, Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()));

    // Orchestrator
    register(registry, Box::new(ORCHESTRATOR_RUNNING.clone()));
    register(registry, Box::new(PROCESSING_RECORDS.clone()));

    // Core metrics (trigger, pollers, reconciliation)
    for metric in vidrelay_core::metrics::all_metrics() {
        register(registry, metric);
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Update gauges that mirror orchestrator state before encoding.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status().await;
    ORCHESTRATOR_RUNNING.set(if status.running { 1 } else { 0 });
    PROCESSING_RECORDS.set(status.processing_count as i64);
}

/// Normalize a path for metric labels.
///
/// Object paths are unbounded, so everything after `/jobs/` and
/// `/objects/` collapses into a placeholder.
pub fn normalize_path(path: &str) -> String {
    for (prefix, placeholder) in [
        ("/api/v1/jobs/", "{source_path}"),
        ("/objects/", "{path}"),
    ] {
        if let Some(rest) = path.strip_prefix(prefix) {
            if !rest.is_empty() {
                return format!("{}{}", prefix, placeholder);
            }
        }
    }
    path.to_string()
}
