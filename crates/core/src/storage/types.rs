//! Object store trait, errors and path rules.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from object storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object path is not acceptable for storage or URL construction.
    #[error("Invalid object path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    fn invalid_path(path: &str, reason: &str) -> Self {
        StorageError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Check that an object path is relative and free of traversal segments.
pub fn validate_object_path(path: &str) -> Result<(), StorageError> {
    if path.is_empty() {
        return Err(StorageError::invalid_path(path, "path is empty"));
    }
    if path.starts_with('/') {
        return Err(StorageError::invalid_path(path, "path must be relative"));
    }
    for segment in path.split('/') {
        match segment {
            "" => return Err(StorageError::invalid_path(path, "empty path segment")),
            "." | ".." => {
                return Err(StorageError::invalid_path(path, "relative path segment"));
            }
            s if s.contains('\\') || s.contains('\0') => {
                return Err(StorageError::invalid_path(path, "illegal character"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Validate a path and join it to a base URL, percent-encoding each segment.
pub fn object_url(base_url: &str, path: &str) -> Result<String, StorageError> {
    validate_object_path(path)?;
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    Ok(format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        encoded.join("/")
    ))
}

/// Trait for object storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// URL at which the transcoding service can fetch the object. No I/O.
    fn public_url(&self, path: &str) -> Result<String, StorageError>;

    /// Write an object, replacing any existing one.
    ///
    /// Either the full object becomes visible or an error is returned.
    async fn upload(&self, path: &str, data: Bytes, content_type: &str)
        -> Result<(), StorageError>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn remove(&self, path: &str) -> Result<(), StorageError>;
}
