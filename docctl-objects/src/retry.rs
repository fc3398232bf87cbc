//! Retry with exponential backoff for idempotent store setup calls.
//!
//! Only bucket setup is retried. Uploads and deletes run inside a database
//! transaction and fail the transaction on the first error.
//!
//! # Example
//!
//! ```rust,no_run
//! use docctl_objects::retry::{with_retry_if, RetryConfig};
//! use docctl_objects::ObjectStoreError;
//!
//! async fn example() -> Result<bool, ObjectStoreError> {
//!     with_retry_if(
//!         &RetryConfig::default(),
//!         || async { Ok(true) },
//!         ObjectStoreError::is_retryable,
//!     )
//!     .await
//! }
//! ```

use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Base for exponential backoff (typically 2.0)
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Default backoff with a custom attempt budget (at least one attempt).
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Short delays, for tests and local stores.
    pub fn fast() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            exponential_base: 2.0,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            exponential_base: 1.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Execute `f`, retrying errors accepted by `is_retryable`.
///
/// # Returns
///
/// The first success, the first non-retryable error, or the last error once
/// the attempt budget is spent.
pub async fn with_retry_if<F, Fut, T, E, P>(config: &RetryConfig, mut f: F, mut is_retryable: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(attempts = attempt, "Object store call succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) => {
                debug!(error = ?e, "Object store error is not retryable");
                return Err(e);
            }
            Err(e) if attempt >= config.max_attempts => {
                error!(attempts = attempt, error = ?e, "Object store retries exhausted");
                return Err(e);
            }
            Err(e) => {
                warn!(
                    attempt = attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis(),
                    error = ?e,
                    "Object store call failed, retrying"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}
