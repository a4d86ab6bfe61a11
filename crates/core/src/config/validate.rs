use super::{
    types::{Config, StorageBackend},
    ConfigError,
};

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Job service URL is set
/// - Poll/timeout budget fits under the host execution ceiling
/// - Storage backend has what it needs to produce fetchable URLs
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.job_service.url.trim().is_empty() {
        return Err(invalid("job_service.url cannot be empty"));
    }

    let orch = &config.orchestrator;
    if orch.poll_interval_ms == 0 {
        return Err(invalid("orchestrator.poll_interval_ms cannot be 0"));
    }
    if orch.timeout_secs == 0 {
        return Err(invalid("orchestrator.timeout_secs cannot be 0"));
    }
    if orch.timeout_secs >= orch.execution_ceiling_secs {
        return Err(invalid(format!(
            "orchestrator.timeout_secs ({}) must be below execution_ceiling_secs ({})",
            orch.timeout_secs, orch.execution_ceiling_secs
        )));
    }
    if orch.poll_interval_ms >= orch.timeout_secs.saturating_mul(1000) {
        return Err(invalid(
            "orchestrator.poll_interval_ms must be shorter than timeout_secs",
        ));
    }
    if orch.finalize_max_attempts == 0 {
        return Err(invalid("orchestrator.finalize_max_attempts cannot be 0"));
    }
    if orch.source_extension.trim_start_matches('.').is_empty() {
        return Err(invalid("orchestrator.source_extension cannot be empty"));
    }

    match config.storage.backend {
        StorageBackend::S3 => {
            if config.storage.s3.is_none() {
                return Err(invalid("storage.backend = \"s3\" requires [storage.s3]"));
            }
        }
        StorageBackend::Fs => {
            if config.storage.public_base_url.is_none() {
                return Err(invalid(
                    "storage.backend = \"fs\" requires storage.public_base_url",
                ));
            }
        }
    }

    Ok(())
}
