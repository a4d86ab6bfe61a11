use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidrelay_core::{
    create_object_store, load_config, load_config_from_env, validate_config, Config, HttpJobClient,
    JobClient, SqliteStatusStore, StatusStore, TranscodeOrchestrator,
};
use vidrelay_server::api::create_router;
use vidrelay_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load from the config file if it exists, otherwise from the environment alone.
fn load(config_path: &Path) -> Result<Config> {
    if config_path.exists() {
        info!("Loading configuration from {:?}", config_path);
        load_config(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))
    } else {
        info!(
            "No config file at {:?}, using environment variables only",
            config_path
        );
        load_config_from_env().context("Failed to load config from environment")
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("vidrelay {}", VERSION);

    // Determine config path
    let config_path = std::env::var("VIDRELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let config = load(&config_path)?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Storage backend: {:?}", config.storage.backend);

    // Fingerprint the effective config
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(config_hash = &config_hash[..16], "Configuration fingerprint");

    // Create SQLite status store
    let status_store: Arc<dyn StatusStore> = Arc::new(
        SqliteStatusStore::new(&config.database.path)
            .context("Failed to create status store")?,
    );
    info!("Status store initialized");

    // Create job service client
    let job_client: Arc<dyn JobClient> = Arc::new(
        HttpJobClient::new(config.job_service.clone())
            .context("Failed to create job service client")?,
    );
    info!("Job service client targeting {}", config.job_service.url);

    // Create object store
    let object_store = create_object_store(&config.storage)
        .await
        .context("Failed to create object store")?;
    info!("Using object store: {}", object_store.name());

    // Create and start the orchestrator
    let orchestrator = Arc::new(TranscodeOrchestrator::new(
        config.orchestrator.clone(),
        job_client,
        Arc::clone(&status_store),
        object_store,
    ));
    orchestrator.start().await;

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        Arc::clone(&orchestrator),
        status_store,
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Pollers exit and leave their records processing for the next start
    info!("Stopping orchestrator...");
    orchestrator.stop().await;

    info!("Server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
