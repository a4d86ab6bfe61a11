//! Local directory object store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{object_url, validate_object_path, ObjectStore, StorageError};

/// Object store rooted at a local directory.
///
/// Objects are served over HTTP by the server under the configured
/// public base URL.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStore {
    /// Create the store, creating `root` if needed.
    pub async fn new(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::Config(format!(
                "failed to create storage directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            root,
            public_base_url: public_base_url.into(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        validate_object_path(path)?;
        Ok(self.root.join(path))
    }
}

/// Temporary sibling used while writing `dest`.
fn temp_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{}.{}.partial", name, uuid::Uuid::new_v4()))
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &str {
        "fs"
    }

    fn public_url(&self, path: &str) -> Result<String, StorageError> {
        object_url(&self.public_base_url, path)
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        let dest = self.object_path(path)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = temp_path(&dest);
        let write = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&tmp, &dest).await
        };

        if let Err(e) = write.await {
            if let Err(cleanup) = fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove partial file {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(StorageError::UploadFailed(format!(
                "{}: {}",
                dest.display(),
                e
            )));
        }

        debug!(path = %dest.display(), size_bytes = data.len(), "Object written");
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let target = self.object_path(path)?;
        match fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "{}: {}",
                target.display(),
                e
            ))),
        }
    }
}
