//! Object store configuration.
//!
//! Provides the endpoint, bucket, credentials, and timeout settings for the
//! object store holding uploaded document versions. Configuration is loaded
//! from environment variables with sensible defaults for local development.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

/// Object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Host and optional port of the store (e.g., "minio.internal:9000").
    pub endpoint: String,

    /// Bucket holding document versions.
    pub bucket: String,

    /// Region used when the bucket has to be created.
    pub region: String,

    /// Bearer token for the store gateway.
    pub access_token: Option<String>,

    /// Whether to use HTTPS for requests and public URLs.
    pub use_ssl: bool,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum attempts when ensuring the bucket exists.
    pub max_retries: u32,
}

impl Default for ObjectStoreConfig {
    /// Returns default configuration for a local store reached over HTTPS.
    fn default() -> Self {
        Self {
            endpoint: "localhost:9000".to_string(),
            bucket: "documents".to_string(),
            region: "us-east-1".to_string(),
            access_token: None,
            use_ssl: true,
            timeout_secs: 10,
            max_retries: 3,
        }
    }
}

impl ObjectStoreConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OBJECT_STORE_ENDPOINT`: Store host and port (default: localhost:9000)
    /// - `OBJECT_STORE_BUCKET`: Bucket name (default: documents)
    /// - `OBJECT_STORE_REGION`: Bucket region (default: us-east-1)
    /// - `OBJECT_STORE_ACCESS_TOKEN`: Bearer token for the store gateway
    /// - `OBJECT_STORE_USE_SSL`: Whether to use HTTPS (default: true)
    /// - `OBJECT_STORE_TIMEOUT_SECS`: Request timeout in seconds (default: 10)
    /// - `OBJECT_STORE_MAX_RETRIES`: Bucket setup attempts (default: 3)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            endpoint: std::env::var("OBJECT_STORE_ENDPOINT").unwrap_or(default.endpoint),
            bucket: std::env::var("OBJECT_STORE_BUCKET").unwrap_or(default.bucket),
            region: std::env::var("OBJECT_STORE_REGION").unwrap_or(default.region),
            access_token: std::env::var("OBJECT_STORE_ACCESS_TOKEN").ok(),
            use_ssl: std::env::var("OBJECT_STORE_USE_SSL")
                .map(|s| !matches!(s.trim().to_lowercase().as_str(), "false" | "0" | "no"))
                .unwrap_or(default.use_ssl),
            timeout_secs: std::env::var("OBJECT_STORE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.timeout_secs),
            max_retries: std::env::var("OBJECT_STORE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_retries),
        }
    }

    /// Get the request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// URL scheme for requests and public links.
    pub fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "https"
        } else {
            "http"
        }
    }

    /// Base URL of the store (`{scheme}://{endpoint}`).
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme(), self.endpoint.trim_end_matches('/'))
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("OBJECT_STORE_ENDPOINT".to_string()));
        }
        if self.endpoint.contains("://") {
            return Err(ConfigError::InvalidValue {
                key: "OBJECT_STORE_ENDPOINT".to_string(),
                message: "expected host[:port] without a scheme".to_string(),
            });
        }
        if self.bucket.trim().is_empty() || self.bucket.contains('/') {
            return Err(ConfigError::InvalidValue {
                key: "OBJECT_STORE_BUCKET".to_string(),
                message: format!("invalid bucket name {:?}", self.bucket),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OBJECT_STORE_TIMEOUT_SECS".to_string(),
                message: "timeout must be at least one second".to_string(),
            });
        }
        Ok(())
    }

    /// Validate that credentials are present for production.
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.access_token.is_none() {
            return Err(ConfigError::MissingEnvVar("OBJECT_STORE_ACCESS_TOKEN".to_string()));
        }
        if !self.use_ssl {
            return Err(ConfigError::InvalidValue {
                key: "OBJECT_STORE_USE_SSL".to_string(),
                message: "production stores must use HTTPS".to_string(),
            });
        }
        Ok(())
    }
}
