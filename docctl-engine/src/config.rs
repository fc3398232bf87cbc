//! Engine configuration.
//!
//! Combines the object store settings with the document lifecycle and RBAC
//! settings. Loaded from environment variables with defaults suitable for
//! local development.

use docctl_objects::ObjectStoreConfig;
use docctl_rbac::Action;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Default upload limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Object store holding uploaded versions
    pub objects: ObjectStoreConfig,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,

    /// Accepted MIME types, lowercased
    pub allowed_mime_types: Vec<String>,

    /// Key directory for uploaded versions
    pub version_directory: String,

    /// Status given to new documents
    pub initial_status: String,

    /// Guard name of roles created by the engine
    pub guard_name: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            objects: ObjectStoreConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            allowed_mime_types: vec![
                "application/pdf".to_string(),
                "image/jpeg".to_string(),
                "image/png".to_string(),
            ],
            version_directory: "document-versions".to_string(),
            initial_status: "Draft".to_string(),
            guard_name: "api".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `OBJECT_STORE_*`: see [`ObjectStoreConfig::from_env`]
    /// - `DOCUMENT_MAX_UPLOAD_BYTES`: Upload limit (default: 10485760)
    /// - `DOCUMENT_ALLOWED_MIME_TYPES`: Comma-separated MIME types
    ///   (default: application/pdf,image/jpeg,image/png)
    /// - `DOCUMENT_VERSION_DIRECTORY`: Key directory (default: document-versions)
    /// - `DOCUMENT_INITIAL_STATUS`: Status of new documents (default: Draft)
    /// - `RBAC_GUARD_NAME`: Guard of engine-created roles (default: api)
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            objects: ObjectStoreConfig::from_env(),
            max_upload_bytes: std::env::var("DOCUMENT_MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default.max_upload_bytes),
            allowed_mime_types: std::env::var("DOCUMENT_ALLOWED_MIME_TYPES")
                .map(|s| parse_mime_list(&s))
                .unwrap_or(default.allowed_mime_types),
            version_directory: std::env::var("DOCUMENT_VERSION_DIRECTORY")
                .unwrap_or(default.version_directory),
            initial_status: std::env::var("DOCUMENT_INITIAL_STATUS").unwrap_or(default.initial_status),
            guard_name: std::env::var("RBAC_GUARD_NAME").unwrap_or(default.guard_name),
        }
    }

    /// Whether uploads of `mime` are accepted.
    pub fn accepts_mime(&self, mime: &str) -> bool {
        self.allowed_mime_types.iter().any(|m| m == mime)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> EngineResult<()> {
        self.objects.validate()?;
        if self.max_upload_bytes == 0 {
            return Err(EngineError::Config(
                "DOCUMENT_MAX_UPLOAD_BYTES must be positive".to_string(),
            ));
        }
        if self.allowed_mime_types.is_empty() {
            return Err(EngineError::Config(
                "DOCUMENT_ALLOWED_MIME_TYPES must list at least one type".to_string(),
            ));
        }
        if self.version_directory.trim_matches('/').is_empty() {
            return Err(EngineError::Config(
                "DOCUMENT_VERSION_DIRECTORY must not be empty".to_string(),
            ));
        }
        if Action::from_status(&self.initial_status).is_none() {
            return Err(EngineError::Config(format!(
                "DOCUMENT_INITIAL_STATUS {:?} is not a usable status name",
                self.initial_status
            )));
        }
        if self.guard_name.trim().is_empty() {
            return Err(EngineError::Config("RBAC_GUARD_NAME must not be empty".to_string()));
        }
        Ok(())
    }
}

fn parse_mime_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(|m| m.trim().to_lowercase())
        .filter(|m| !m.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.accepts_mime("application/pdf"));
        assert!(!config.accepts_mime("text/html"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_mime_list() {
        assert_eq!(
            parse_mime_list(" Application/PDF, ,image/png "),
            vec!["application/pdf".to_string(), "image/png".to_string()]
        );
    }

    #[test]
    fn test_validation() {
        let config = EngineConfig {
            allowed_mime_types: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));

        let config = EngineConfig {
            initial_status: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
