//! Utility modules

pub mod rate_limit;
pub mod retry;

pub use rate_limit::{courtesy_limiter, keyed_courtesy_limiter};
pub use retry::{retry_with_backoff, RetryPolicy, Retryable};
