//! Courtesy rate limiters
//!
//! Every client owns its own limiter instance; nothing is process-wide, so
//! clients (and their tests) never interfere with each other.

use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

fn quota_for(interval: Duration) -> Quota {
    Quota::with_period(interval.max(Duration::from_millis(1)))
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

/// One request per `interval`, for a single upstream service
pub fn courtesy_limiter(interval: Duration) -> DefaultDirectRateLimiter {
    RateLimiter::direct(quota_for(interval))
}

/// One request per `interval` for each key (e.g. URL host)
pub fn keyed_courtesy_limiter(interval: Duration) -> DefaultKeyedRateLimiter<String> {
    RateLimiter::keyed(quota_for(interval))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_second_request_waits_for_interval() {
        let limiter = courtesy_limiter(Duration::from_millis(200));

        let start = Instant::now();
        limiter.until_ready().await;
        limiter.until_ready().await;

        assert!(
            start.elapsed() >= Duration::from_millis(150),
            "second request should have been delayed, elapsed {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn test_keys_do_not_share_budget() {
        let limiter = keyed_courtesy_limiter(Duration::from_secs(10));

        assert!(limiter.check_key(&"a.example".to_string()).is_ok());
        assert!(limiter.check_key(&"b.example".to_string()).is_ok());
        assert!(limiter.check_key(&"a.example".to_string()).is_err());
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let limiter = courtesy_limiter(Duration::ZERO);
        assert!(limiter.check().is_ok());
    }
}
