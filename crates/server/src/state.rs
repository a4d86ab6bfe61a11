use std::sync::Arc;
use vidrelay_core::{Config, SanitizedConfig, StatusStore, TranscodeOrchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<TranscodeOrchestrator>,
    status_store: Arc<dyn StatusStore>,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<TranscodeOrchestrator>,
        status_store: Arc<dyn StatusStore>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            status_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &TranscodeOrchestrator {
        &self.orchestrator
    }

    pub fn status_store(&self) -> &dyn StatusStore {
        self.status_store.as_ref()
    }
}
