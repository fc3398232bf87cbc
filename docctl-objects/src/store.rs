//! # Object Store Contract
//!
//! The narrow interface the document lifecycle needs from an object store,
//! plus key and URL conventions.
//!
//! ```text
//! key        = {directory}/{uuid}{ext}          e.g. document-versions/0190...c2.pdf
//! public url = {scheme}://{endpoint}/{bucket}/{key}
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ObjectResult;
use crate::retry::{with_retry_if, RetryConfig};

/// Object store operations used by the document lifecycle.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`.
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()>;

    /// Delete the object under `key`.
    async fn remove(&self, bucket: &str, key: &str) -> ObjectResult<()>;

    /// Make the object under `key` publicly readable.
    async fn make_public(&self, bucket: &str, key: &str) -> ObjectResult<()>;

    /// Whether `bucket` exists.
    async fn bucket_exists(&self, bucket: &str) -> ObjectResult<bool>;

    /// Create `bucket` in `region`.
    async fn make_bucket(&self, bucket: &str, region: &str) -> ObjectResult<()>;
}

/// A file handed to the lifecycle for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// Original file name, used for the key extension.
    pub filename: String,
    /// Declared MIME type.
    pub content_type: String,
    /// File contents.
    #[serde(skip)]
    pub body: Bytes,
}

impl Upload {
    /// Create an upload.
    pub fn new(filename: impl Into<String>, content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Lowercased extension including the dot, or empty.
    pub fn extension(&self) -> String {
        extension_of(&self.filename)
    }

    /// MIME type without parameters, lowercased.
    pub fn mime_essence(&self) -> String {
        self.content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase()
    }
}

fn extension_of(filename: &str) -> String {
    let name = filename.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(filename);
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name[idx..].to_lowercase(),
        _ => String::new(),
    }
}

/// Generate a collision-resistant key `{directory}/{uuid}{ext}`.
///
/// # Example
///
/// ```
/// use docctl_objects::object_key;
///
/// let key = object_key("document-versions", "Invoice Q1.PDF");
/// assert!(key.starts_with("document-versions/"));
/// assert!(key.ends_with(".pdf"));
/// ```
pub fn object_key(directory: &str, filename: &str) -> String {
    let directory = directory.trim_matches('/');
    let id = Uuid::now_v7();
    let ext = extension_of(filename);
    if directory.is_empty() {
        format!("{}{}", id, ext)
    } else {
        format!("{}/{}{}", directory, id, ext)
    }
}

/// Public URL of an object.
pub fn public_url(scheme: &str, endpoint: &str, bucket: &str, key: &str) -> String {
    format!(
        "{}://{}/{}/{}",
        scheme,
        endpoint.trim_end_matches('/'),
        bucket,
        key.trim_start_matches('/')
    )
}

/// Create `bucket` if it does not exist, retrying transient failures.
///
/// # Returns
///
/// `true` if the bucket was created.
#[instrument(skip(store, retry))]
pub async fn ensure_bucket(
    store: &dyn ObjectStore,
    bucket: &str,
    region: &str,
    retry: &RetryConfig,
) -> ObjectResult<bool> {
    let exists = with_retry_if(retry, || store.bucket_exists(bucket), |e| e.is_retryable()).await?;
    if exists {
        return Ok(false);
    }
    with_retry_if(retry, || store.make_bucket(bucket, region), |e| e.is_retryable()).await?;
    info!(bucket, region, "Created object store bucket");
    Ok(true)
}
