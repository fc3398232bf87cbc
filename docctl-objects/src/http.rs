//! HTTP object store client.
//!
//! Talks to a path-style, S3-compatible gateway (`{base}/{bucket}/{key}`)
//! authenticated with a bearer token. Every call is bounded by the configured
//! timeout; a timeout or any non-2xx response is returned as an error.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument, warn};

use crate::config::ObjectStoreConfig;
use crate::error::{ObjectResult, ObjectStoreError};
use crate::store::ObjectStore;

/// ACL header understood by S3-compatible stores.
const ACL_HEADER: &str = "x-amz-acl";

/// HTTP object store client.
#[derive(Clone)]
pub struct HttpObjectStore {
    /// HTTP client instance.
    client: Client,

    /// Store configuration.
    config: ObjectStoreConfig,
}

impl HttpObjectStore {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::InvalidConfig`] if the configuration does
    /// not validate or the HTTP client cannot be built.
    pub fn new(config: ObjectStoreConfig) -> ObjectResult<Self> {
        config
            .validate()
            .map_err(|e| ObjectStoreError::InvalidConfig(e.to_string()))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ObjectStoreError::InvalidConfig(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Store configuration.
    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{}", self.config.base_url(), bucket)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}", self.bucket_url(bucket), key.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.access_token {
            Some(ref token) => request.header("Authorization", format!("Bearer {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> ObjectResult<Response> {
        self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                ObjectStoreError::Timeout(self.config.timeout_secs)
            } else {
                ObjectStoreError::RequestFailed(e)
            }
        })
    }

    async fn expect_success(&self, response: Response) -> ObjectResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!("Object store error ({}): {}", status.as_u16(), message);
        Err(ObjectStoreError::ApiError {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> ObjectResult<()> {
        debug!("Uploading object");
        let request = self
            .client
            .put(self.object_url(bucket, key))
            .header("Content-Type", content_type)
            .body(body);
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::BucketNotFound(bucket.to_string()));
        }
        self.expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn remove(&self, bucket: &str, key: &str) -> ObjectResult<()> {
        debug!("Removing object");
        let response = self.send(self.client.delete(self.object_url(bucket, key))).await?;
        self.expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn make_public(&self, bucket: &str, key: &str) -> ObjectResult<()> {
        let request = self
            .client
            .put(format!("{}?acl", self.object_url(bucket, key)))
            .header(ACL_HEADER, "public-read");
        let response = self.send(request).await?;
        self.expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> ObjectResult<bool> {
        let response = self.send(self.client.head(self.bucket_url(bucket))).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => self.expect_success(response).await.map(|_| false),
        }
    }

    #[instrument(skip(self))]
    async fn make_bucket(&self, bucket: &str, region: &str) -> ObjectResult<()> {
        let body = format!(
            "<CreateBucketConfiguration><LocationConstraint>{}</LocationConstraint></CreateBucketConfiguration>",
            region
        );
        let request = self
            .client
            .put(self.bucket_url(bucket))
            .header("Content-Type", "application/xml")
            .body(body);
        let response = self.send(request).await?;
        self.expect_success(response).await
    }
}
