//! In-process object store.
//!
//! Keeps objects in memory and can be told to fail uploads or deletes, so the
//! lifecycle's rollback paths can be exercised without a network.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ObjectResult, ObjectStoreError};
use crate::store::ObjectStore;

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object contents.
    pub body: Bytes,
    /// Content type given on upload.
    pub content_type: String,
    /// Whether the object was made public.
    pub public: bool,
}

/// In-memory [`ObjectStore`].
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    buckets: Arc<RwLock<HashSet<String>>>,
    fail_puts: Arc<AtomicBool>,
    fail_removes: Arc<AtomicBool>,
    puts: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    /// Create an empty store with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with `bucket` already present.
    pub async fn with_bucket(bucket: &str) -> Self {
        let store = Self::new();
        store.buckets.write().await.insert(bucket.to_string());
        store
    }

    /// Make subsequent uploads fail.
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent deletes fail.
    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    /// Stored object, if any.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of stored objects.
    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Number of upload attempts, failed ones included.
    pub fn put_attempts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Unavailable("upload rejected".to_string()));
        }
        if !self.buckets.read().await.contains(bucket) {
            return Err(ObjectStoreError::BucketNotFound(bucket.to_string()));
        }
        debug!(bucket, key, size = body.len(), "Stored object in memory");
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
                public: false,
            },
        );
        Ok(())
    }

    async fn remove(&self, bucket: &str, key: &str) -> ObjectResult<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(ObjectStoreError::Unavailable("delete rejected".to_string()));
        }
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), key.to_string()))
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::ApiError {
                status: 404,
                message: format!("no such key {}", key),
            })
    }

    async fn make_public(&self, bucket: &str, key: &str) -> ObjectResult<()> {
        let mut objects = self.objects.write().await;
        let object = objects
            .get_mut(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| ObjectStoreError::ApiError {
                status: 404,
                message: format!("no such key {}", key),
            })?;
        object.public = true;
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> ObjectResult<bool> {
        Ok(self.buckets.read().await.contains(bucket))
    }

    async fn make_bucket(&self, bucket: &str, _region: &str) -> ObjectResult<()> {
        self.buckets.write().await.insert(bucket.to_string());
        Ok(())
    }
}
