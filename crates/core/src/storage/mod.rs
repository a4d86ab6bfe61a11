//! Object storage abstraction.
//!
//! Resolves stored objects to URLs the transcoding service can fetch,
//! writes finished artifacts and removes sources.

mod fs;
mod s3;
mod types;

use std::sync::Arc;

pub use fs::FsObjectStore;
pub use s3::S3ObjectStore;
pub use types::*;

use crate::config::{StorageBackend, StorageConfig};

/// Build the configured object store backend.
pub async fn create_object_store(
    config: &StorageConfig,
) -> Result<Arc<dyn ObjectStore>, StorageError> {
    match config.backend {
        StorageBackend::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                StorageError::Config("storage.backend = \"s3\" requires [storage.s3]".to_string())
            })?;
            Ok(Arc::new(S3ObjectStore::new(
                s3,
                config.public_base_url.clone(),
            )))
        }
        StorageBackend::Fs => {
            let base_url = config.public_base_url.clone().ok_or_else(|| {
                StorageError::Config("fs storage requires storage.public_base_url".to_string())
            })?;
            let store = FsObjectStore::new(&config.fs.root, base_url).await?;
            Ok(Arc::new(store))
        }
    }
}
