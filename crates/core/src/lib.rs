pub mod config;
pub mod job_client;
pub mod metrics;
pub mod orchestrator;
pub mod status;
pub mod storage;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, SanitizedConfig, StorageBackend,
};
pub use job_client::{HttpJobClient, JobClient, JobClientError, JobHandle, JobStatus};
pub use orchestrator::{
    ObjectCreatedEvent, OrchestratorConfig, OrchestratorStatus, PollOutcome, TranscodeOrchestrator,
    TriggerError, TriggerOutcome,
};
pub use status::{
    SqliteStatusStore, StatusError, StatusFilter, StatusStore, TranscodeRecord, TranscodeStatus,
};
pub use storage::{create_object_store, FsObjectStore, ObjectStore, S3ObjectStore, StorageError};
