//! Error types for engine operations
//!
//! Every failure of a protected operation is one of five outcomes. Store and
//! object-store errors are mapped onto them at the crate boundary.

use docctl_objects::{ConfigError, ObjectStoreError};
use docctl_rbac::PolicyError;
use docctl_registry::StoreError;
use thiserror::Error;

/// Engine error types.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A unique key is already taken
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The referenced row does not exist or was soft-deleted
    #[error("Not found: {0}")]
    NotFound(String),

    /// The input was rejected before any persistence attempt
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The tuple store or object store failed; nothing was applied
    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    /// The access decision denied the operation
    #[error("Forbidden: {subject} may not {action} {resource}")]
    Forbidden {
        /// Acting subject
        subject: String,
        /// Resource policy
        resource: String,
        /// Requested action
        action: String,
    },

    /// Engine configuration is invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    /// Check if this error should be logged at error level.
    ///
    /// Conflicts, validation errors and denials are expected outcomes.
    pub fn is_server_error(&self) -> bool {
        matches!(self, EngineError::DependencyFailure(_) | EngineError::Config(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EngineError::Conflict(_) => 409,
            EngineError::NotFound(_) => 404,
            EngineError::Validation(_) => 422,
            EngineError::Forbidden { .. } => 403,
            EngineError::DependencyFailure(_) => 502,
            EngineError::Config(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::Forbidden { .. } => "FORBIDDEN",
            EngineError::DependencyFailure(_) => "DEPENDENCY_FAILURE",
            EngineError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => EngineError::Conflict(msg),
            StoreError::NotFound(msg) => EngineError::NotFound(msg),
            StoreError::Unavailable(msg) => EngineError::DependencyFailure(msg),
        }
    }
}

impl From<PolicyError> for EngineError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidRule(msg) | PolicyError::InvalidTuple(msg) => EngineError::Validation(msg),
            other => EngineError::DependencyFailure(format!("policy store: {}", other)),
        }
    }
}

impl From<ObjectStoreError> for EngineError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::InvalidConfig(msg) => EngineError::Config(msg),
            other => EngineError::DependencyFailure(format!("object store: {}", other)),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_onto_taxonomy() {
        let conflict: EngineError = StoreError::Conflict("prefix FIN".into()).into();
        assert_eq!(conflict.status_code(), 409);

        let missing: EngineError = StoreError::NotFound("role".into()).into();
        assert_eq!(missing.error_code(), "NOT_FOUND");

        let down: EngineError = StoreError::Unavailable("db".into()).into();
        assert!(down.is_server_error());
    }

    #[test]
    fn test_object_errors_are_dependency_failures() {
        let err: EngineError = ObjectStoreError::Timeout(10).into();
        assert!(matches!(err, EngineError::DependencyFailure(_)));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_policy_errors() {
        let invalid: EngineError = PolicyError::InvalidRule("blank".into()).into();
        assert!(matches!(invalid, EngineError::Validation(_)));

        let unloaded: EngineError = PolicyError::NotLoaded.into();
        assert!(matches!(unloaded, EngineError::DependencyFailure(_)));
    }

    #[test]
    fn test_forbidden_is_not_a_server_error() {
        let err = EngineError::Forbidden {
            subject: "bob".into(),
            resource: "roles".into(),
            action: "create".into(),
        };
        assert!(!err.is_server_error());
        assert_eq!(err.to_string(), "Forbidden: bob may not create roles");
    }
}
