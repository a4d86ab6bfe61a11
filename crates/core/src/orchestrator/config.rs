//! Orchestrator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the transcode orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Delay between status requests for one job (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Polling budget per job (seconds). A poller that runs out of budget
    /// leaves the record `processing` for reconciliation.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Hard lifetime of the host execution environment (seconds).
    /// `timeout_secs` must stay below it.
    #[serde(default = "default_execution_ceiling")]
    pub execution_ceiling_secs: u64,

    /// Delete the raw upload after the artifact is written.
    #[serde(default)]
    pub delete_source_on_success: bool,

    /// Extension of raw uploads that trigger transcoding (case-insensitive).
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Prefix under which transcoded artifacts are written.
    #[serde(default = "default_output_prefix")]
    pub output_prefix: String,

    /// Only accept events for this bucket when set.
    #[serde(default)]
    pub watch_bucket: Option<String>,

    /// Download/upload attempts after a successful transcode.
    #[serde(default = "default_finalize_attempts")]
    pub finalize_max_attempts: u32,

    /// Delay between finalize attempts (milliseconds).
    #[serde(default = "default_finalize_retry_delay")]
    pub finalize_retry_delay_ms: u64,

    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

fn default_poll_interval() -> u64 {
    5000 // 5 seconds
}

fn default_timeout() -> u64 {
    240
}

fn default_execution_ceiling() -> u64 {
    400
}

fn default_source_extension() -> String {
    "mp4".to_string()
}

fn default_output_prefix() -> String {
    "compressed".to_string()
}

fn default_finalize_attempts() -> u32 {
    3
}

fn default_finalize_retry_delay() -> u64 {
    1000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            timeout_secs: default_timeout(),
            execution_ceiling_secs: default_execution_ceiling(),
            delete_source_on_success: false,
            source_extension: default_source_extension(),
            output_prefix: default_output_prefix(),
            watch_bucket: None,
            finalize_max_attempts: default_finalize_attempts(),
            finalize_retry_delay_ms: default_finalize_retry_delay(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn finalize_retry_delay(&self) -> Duration {
        Duration::from_millis(self.finalize_retry_delay_ms)
    }
}

/// Sweep that re-attaches pollers to `processing` records nobody is tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Run the periodic sweep. Recovery on start happens regardless.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_reconcile_interval")]
    pub interval_secs: u64,

    /// A processing record not updated for this long is considered stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Maximum records handled per sweep.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,

    /// Records whose current job was submitted longer ago than this are
    /// marked failed instead.
    #[serde(default = "default_give_up_after")]
    pub give_up_after_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval() -> u64 {
    300
}

fn default_stale_after() -> u64 {
    600
}

fn default_batch_limit() -> i64 {
    50
}

fn default_give_up_after() -> u64 {
    86_400 // 24 hours
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval(),
            stale_after_secs: default_stale_after(),
            batch_limit: default_batch_limit(),
            give_up_after_secs: default_give_up_after(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.poll_interval_ms, 5000);
        assert_eq!(config.timeout_secs, 240);
        assert_eq!(config.execution_ceiling_secs, 400);
        assert!(!config.delete_source_on_success);
        assert_eq!(config.source_extension, "mp4");
        assert_eq!(config.output_prefix, "compressed");
        assert!(config.watch_bucket.is_none());
        assert_eq!(config.finalize_max_attempts, 3);
        assert!(config.reconcile.enabled);
        assert_eq!(config.reconcile.stale_after_secs, 600);
    }

    #[test]
    fn test_deserialize_minimal() {
        let toml = r#"
            delete_source_on_success = true
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert!(config.delete_source_on_success);
        assert_eq!(config.poll_interval_ms, 5000);
        assert_eq!(config.reconcile.interval_secs, 300);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            poll_interval_ms = 2000
            timeout_secs = 120
            execution_ceiling_secs = 300
            source_extension = "mov"
            output_prefix = "web"
            watch_bucket = "media"
            finalize_max_attempts = 5
            finalize_retry_delay_ms = 250

            [reconcile]
            enabled = false
            interval_secs = 60
            stale_after_secs = 180
            batch_limit = 10
            give_up_after_secs = 3600
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert_eq!(config.source_extension, "mov");
        assert_eq!(config.watch_bucket.as_deref(), Some("media"));
        assert_eq!(config.finalize_retry_delay(), Duration::from_millis(250));
        assert!(!config.reconcile.enabled);
        assert_eq!(config.reconcile.batch_limit, 10);
    }
}
