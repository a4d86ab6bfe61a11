use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};
use vidrelay_core::StorageBackend;

use super::{events, handlers, jobs, middleware::metrics_middleware, orchestrator};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Storage events
        .route("/events/object-created", post(events::object_created))
        // Status queries
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{*source_path}", get(jobs::get_job))
        // Orchestrator
        .route("/orchestrator/status", get(orchestrator::get_status))
        .route("/orchestrator/reconcile", post(orchestrator::reconcile))
        .with_state(Arc::clone(&state));

    let mut router = Router::new()
        .route("/metrics", get(handlers::get_metrics))
        .with_state(Arc::clone(&state))
        .nest("/api/v1", api_routes);

    // The fs backend hands out URLs under /objects; serve them read-only
    let storage = &state.config().storage;
    if storage.backend == StorageBackend::Fs {
        router = router.nest_service("/objects", ServeDir::new(&storage.fs.root));
    }

    router
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
