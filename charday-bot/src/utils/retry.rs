//! Bounded retry with exponential backoff
//!
//! **Algorithm:**
//! 1. Attempt operation
//! 2. If successful, return result
//! 3. If the error is retryable (rate limit, network, 5xx):
//!    a. If attempts remain: log WARN, back off, retry
//!    b. Otherwise: log ERROR, return the last error
//! 4. Any other error is returned immediately
//!
//! Backoff doubles after every failure, capped at `max_backoff`. A server
//! supplied retry-after hint raises the delay for that attempt.

use charday_common::config::RetryConfig;
use std::future::Future;
use std::time::Duration;

/// Errors that can say whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-provided minimum wait before the next attempt
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Attempt budget and backoff curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or the budget is spent
///
/// # Arguments
/// * `operation_name` - Name for logging (e.g., "catalog search")
/// * `policy` - Attempt budget and backoff curve
/// * `operation` - Async closure performing one attempt
pub async fn retry_with_backoff<F, Fut, T, E>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    let mut backoff = policy.initial_backoff;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }

                if attempt >= max_attempts {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        error = %err,
                        "Operation failed: retry budget exhausted"
                    );
                    return Err(err);
                }

                let wait = match err.retry_after() {
                    Some(hint) => hint.max(backoff),
                    None => backoff,
                }
                .min(policy.max_backoff.max(policy.initial_backoff));

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    backoff_ms = wait.as_millis() as u64,
                    error = %err,
                    "Operation failed, will retry after backoff"
                );

                tokio::time::sleep(wait).await;

                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}
