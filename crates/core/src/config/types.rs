use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub job_service: JobServiceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("vidrelay.db")
}

/// External transcoding service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobServiceConfig {
    /// Service base URL (e.g., "https://api.transcoder.example")
    pub url: String,
    /// API key sent as `X-API-KEY`
    pub api_key: String,
    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u32,
    /// Run-time budget sent with each job (default: 600)
    #[serde(default = "default_max_run_secs")]
    pub max_run_secs: u32,
    /// Transcode command; `{{in_1}}` and `{{out_1}}` are substituted by the service
    #[serde(default = "default_command")]
    pub command: String,
}

fn default_request_timeout() -> u32 {
    30
}

fn default_max_run_secs() -> u32 {
    600
}

fn default_command() -> String {
    "-i {{in_1}} -c:v libx264 -preset veryfast -crf 28 -vf scale='min(1280,iw)':-2 \
     -c:a aac -b:a 128k -movflags +faststart {{out_1}}"
        .to_string()
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(default)]
    pub backend: StorageBackend,
    /// Prefix for URLs handed to the transcoding service.
    /// Required for the fs backend; S3 defaults to `{endpoint_url}/{bucket}`.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// S3-specific configuration (required when backend = "s3")
    #[serde(default)]
    pub s3: Option<S3Config>,
    /// Filesystem configuration
    #[serde(default)]
    pub fs: FsStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            public_base_url: None,
            s3: None,
            fs: FsStorageConfig::default(),
        }
    }
}

/// Available storage backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// S3-compatible object storage (AWS, MinIO, R2).
    S3,
    /// Local directory, served by the HTTP server under `/objects`.
    #[default]
    Fs,
}

/// S3-compatible storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct S3Config {
    /// S3 API endpoint URL (e.g., "http://localhost:9000")
    pub endpoint_url: String,
    /// Region (default: "us-east-1")
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Filesystem storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FsStorageConfig {
    /// Root directory for stored objects (default: "./objects")
    #[serde(default = "default_fs_root")]
    pub root: PathBuf,
}

impl Default for FsStorageConfig {
    fn default() -> Self {
        Self {
            root: default_fs_root(),
        }
    }
}

fn default_fs_root() -> PathBuf {
    PathBuf::from("objects")
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub job_service: SanitizedJobServiceConfig,
    pub storage: SanitizedStorageConfig,
    pub orchestrator: OrchestratorConfig,
}

/// Sanitized job service config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedJobServiceConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub timeout_secs: u32,
    pub max_run_secs: u32,
}

/// Sanitized storage config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub backend: StorageBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<SanitizedS3Config>,
    pub fs_root: PathBuf,
}

/// Sanitized S3 config (keys hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedS3Config {
    pub endpoint_url: String,
    pub region: String,
    pub bucket: String,
    pub credentials_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            job_service: SanitizedJobServiceConfig {
                url: config.job_service.url.clone(),
                api_key_configured: !config.job_service.api_key.is_empty(),
                timeout_secs: config.job_service.timeout_secs,
                max_run_secs: config.job_service.max_run_secs,
            },
            storage: SanitizedStorageConfig {
                backend: config.storage.backend,
                public_base_url: config.storage.public_base_url.clone(),
                s3: config.storage.s3.as_ref().map(|s3| SanitizedS3Config {
                    endpoint_url: s3.endpoint_url.clone(),
                    region: s3.region.clone(),
                    bucket: s3.bucket.clone(),
                    credentials_configured: !s3.access_key_id.is_empty()
                        && !s3.secret_access_key.is_empty(),
                }),
                fs_root: config.storage.fs.root.clone(),
            },
            orchestrator: config.orchestrator.clone(),
        }
    }
}
