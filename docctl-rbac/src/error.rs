//! Error types for policy tuple handling and enforcement.

use thiserror::Error;

/// Policy layer errors.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The embedded policy model failed to load or compile.
    #[error("Policy model error: {0}")]
    Model(String),

    /// Enforcement was attempted before any tuple set was loaded.
    #[error("Policy enforcer not loaded")]
    NotLoaded,

    /// The backing tuple store could not be read.
    #[error("Tuple source unavailable: {0}")]
    SourceUnavailable(String),

    /// A stored row does not describe a valid tuple.
    #[error("Invalid tuple: {0}")]
    InvalidTuple(String),

    /// A rule payload failed boundary validation.
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Error raised by the enforcement engine.
    #[error("Enforcement error: {0}")]
    Enforcement(#[from] casbin::Error),
}

/// Result type for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
