//! S3-compatible object store.

use std::time::Instant;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, info};

use super::{object_url, validate_object_path, ObjectStore, StorageError};
use crate::config::S3Config;

/// Object store backed by an S3-compatible bucket (AWS, MinIO, R2).
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    public_base_url: String,
}

impl S3ObjectStore {
    /// Build a client with static credentials and path-style addressing.
    ///
    /// Public URLs default to `{endpoint_url}/{bucket}`.
    pub fn new(config: &S3Config, public_base_url: Option<String>) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "vidrelay",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let public_base_url = public_base_url.unwrap_or_else(|| {
            format!(
                "{}/{}",
                config.endpoint_url.trim_end_matches('/'),
                config.bucket
            )
        });

        info!(
            endpoint = %config.endpoint_url,
            bucket = %config.bucket,
            "S3 object store configured"
        );

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket.clone(),
            public_base_url,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &str {
        "s3"
    }

    fn public_url(&self, path: &str) -> Result<String, StorageError> {
        object_url(&self.public_base_url, path)
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        validate_object_path(path)?;
        let size = data.len();
        let start = Instant::now();

        // PutObject replaces the object in one step; readers never see a partial body.
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(data))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("{}: {}", path, e)))?;

        info!(
            bucket = %self.bucket,
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_millis() as u64,
            "S3 upload complete"
        );

        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        validate_object_path(path)?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed(format!("{}: {}", path, e)))?;

        debug!(bucket = %self.bucket, key = %path, "S3 object deleted");
        Ok(())
    }
}
