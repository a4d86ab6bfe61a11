//! Mock object store for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::storage::{object_url, validate_object_path, ObjectStore, StorageError};

use super::lock;

/// Base URL of objects in the mock store.
pub const MOCK_BASE_URL: &str = "https://storage.test";

/// In-memory object store.
///
/// Public URLs are `https://storage.test/{path}`. Uploads and removals are
/// recorded; one-shot errors can be injected for each.
#[derive(Debug, Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    removed: Mutex<Vec<String>>,
    next_upload_error: Mutex<Option<StorageError>>,
    next_remove_error: Mutex<Option<StorageError>>,
    calls: AtomicUsize,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes at `path`.
    pub fn object(&self, path: &str) -> Option<Bytes> {
        lock(&self.objects).get(path).cloned()
    }

    /// Paths of all stored objects.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = lock(&self.objects).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Paths passed to `remove`, in order.
    pub fn removed(&self) -> Vec<String> {
        lock(&self.removed).clone()
    }

    /// Total trait calls made against the store.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_next_upload_error(&self, error: StorageError) {
        *lock(&self.next_upload_error) = Some(error);
    }

    pub fn set_remove_error(&self, error: StorageError) {
        *lock(&self.next_remove_error) = Some(error);
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    fn name(&self) -> &str {
        "mock"
    }

    fn public_url(&self, path: &str) -> Result<String, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        object_url(MOCK_BASE_URL, path)
    }

    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.next_upload_error).take() {
            return Err(error);
        }
        validate_object_path(path)?;
        lock(&self.objects).insert(path.to_string(), data);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.removed).push(path.to_string());
        if let Some(error) = lock(&self.next_remove_error).take() {
            return Err(error);
        }
        lock(&self.objects).remove(path);
        Ok(())
    }
}
