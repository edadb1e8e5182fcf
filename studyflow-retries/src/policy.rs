//! Retry policies: which failures to retry and how long to wait.

use crate::backoff::exponential_backoff;
use crate::classify::should_retry_error;
use crate::error::{ErrorCategory, RetryError};
use std::time::Duration;

/// Policy for deciding whether to retry and how long to wait first.
///
/// `attempt` is the 1-based number of the attempt that just failed.
pub trait RetryPolicy: Send + Sync {
    /// Check if the error should be retried.
    fn should_retry(&self, error: &RetryError, attempt: u32) -> bool;

    /// Delay before the next attempt, before jitter.
    fn calculate_delay(
        &self,
        error: &RetryError,
        attempt: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
    ) -> Duration {
        let _ = error;
        exponential_backoff(attempt, base_delay, max_delay, backoff_factor)
    }
}

/// Connectivity failures only, up to five attempts, fixed 1.5x growth.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkTimeoutPolicy;

impl NetworkTimeoutPolicy {
    const FACTOR: f64 = 1.5;
    const MAX_ATTEMPT: u32 = 5;
}

impl RetryPolicy for NetworkTimeoutPolicy {
    fn should_retry(&self, error: &RetryError, attempt: u32) -> bool {
        matches!(
            error.category(),
            ErrorCategory::Network | ErrorCategory::Timeout
        ) && attempt <= Self::MAX_ATTEMPT
    }

    fn calculate_delay(
        &self,
        _error: &RetryError,
        attempt: u32,
        base_delay: Duration,
        max_delay: Duration,
        _backoff_factor: f64,
    ) -> Duration {
        exponential_backoff(attempt, base_delay, max_delay, Self::FACTOR)
    }
}

/// Rate limit errors only, up to eight attempts; honours suggested delays.
///
/// A suggested delay is used as-is and is not capped by `max_delay`, so a
/// server sending `Retry-After: 86400` makes the next attempt wait a day.
/// Callers that can't afford that should bound the wait with a cancellation
/// token or clamp the hint before building the error.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitPolicy;

impl RateLimitPolicy {
    const MAX_ATTEMPT: u32 = 8;
}

impl RetryPolicy for RateLimitPolicy {
    fn should_retry(&self, error: &RetryError, attempt: u32) -> bool {
        error.category() == ErrorCategory::RateLimit && attempt <= Self::MAX_ATTEMPT
    }

    fn calculate_delay(
        &self,
        error: &RetryError,
        attempt: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_factor: f64,
    ) -> Duration {
        error
            .suggested_delay()
            .unwrap_or_else(|| exponential_backoff(attempt, base_delay, max_delay, backoff_factor))
    }
}

/// Retries whatever the category rules allow.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerErrorPolicy;

impl RetryPolicy for ServerErrorPolicy {
    fn should_retry(&self, error: &RetryError, attempt: u32) -> bool {
        should_retry_error(error, attempt)
    }
}

/// Never retries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn should_retry(&self, _error: &RetryError, _attempt: u32) -> bool {
        false
    }

    fn calculate_delay(
        &self,
        _error: &RetryError,
        _attempt: u32,
        _base_delay: Duration,
        _max_delay: Duration,
        _backoff_factor: f64,
    ) -> Duration {
        Duration::ZERO
    }
}

/// Fallback used by custom strategies without their own policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl RetryPolicy for DefaultPolicy {
    fn should_retry(&self, error: &RetryError, attempt: u32) -> bool {
        should_retry_error(error, attempt)
    }
}

/// Retry only on specific categories, up to a fixed attempt number.
#[derive(Debug, Clone)]
pub struct CategoryPolicy {
    /// Categories to retry.
    pub categories: Vec<ErrorCategory>,
    /// Last attempt number after which no retry is made.
    pub max_attempt: u32,
}

impl CategoryPolicy {
    /// Create a new category policy.
    pub fn new(categories: impl IntoIterator<Item = ErrorCategory>, max_attempt: u32) -> Self {
        Self {
            categories: categories.into_iter().collect(),
            max_attempt,
        }
    }
}

impl RetryPolicy for CategoryPolicy {
    fn should_retry(&self, error: &RetryError, attempt: u32) -> bool {
        attempt <= self.max_attempt && self.categories.contains(&error.category())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RetryableError;

    const MS: fn(u64) -> Duration = Duration::from_millis;

    fn err(e: RetryableError) -> RetryError {
        e.into()
    }

    #[test]
    fn test_network_timeout_policy() {
        let policy = NetworkTimeoutPolicy;
        let network = err(RetryableError::network("reset"));
        let timeout = err(RetryableError::timeout(MS(50)));
        let server = err(RetryableError::http(500, ""));

        assert!(policy.should_retry(&network, 1));
        assert!(policy.should_retry(&timeout, 5));
        assert!(!policy.should_retry(&network, 6));
        assert!(!policy.should_retry(&server, 1));
    }

    #[test]
    fn test_network_timeout_ignores_configured_factor() {
        let policy = NetworkTimeoutPolicy;
        let network = err(RetryableError::network("reset"));
        assert_eq!(
            policy.calculate_delay(&network, 3, MS(1000), MS(30_000), 4.0),
            MS(2250)
        );
    }

    #[test]
    fn test_rate_limit_policy() {
        let policy = RateLimitPolicy;
        let limited = err(RetryableError::rate_limited(None));
        let server = err(RetryableError::http(503, ""));

        assert!(policy.should_retry(&limited, 8));
        assert!(!policy.should_retry(&limited, 9));
        assert!(!policy.should_retry(&server, 1));
    }

    #[test]
    fn test_rate_limit_prefers_suggested_delay() {
        let policy = RateLimitPolicy;
        let hinted = err(RetryableError::rate_limited(Some(MS(7000))));
        let plain = err(RetryableError::rate_limited(None));

        assert_eq!(
            policy.calculate_delay(&hinted, 1, MS(1000), MS(30_000), 2.0),
            MS(7000)
        );
        assert_eq!(
            policy.calculate_delay(&plain, 3, MS(1000), MS(30_000), 2.0),
            MS(4000)
        );
    }

    #[test]
    fn test_server_error_policy() {
        let policy = ServerErrorPolicy;

        assert!(policy.should_retry(&err(RetryableError::http(500, "")), 1));
        assert!(policy.should_retry(&err(RetryableError::http(503, "")), 9));
        assert!(!policy.should_retry(&err(RetryableError::http(400, "")), 1));
        assert_eq!(
            policy.calculate_delay(&err(RetryableError::http(500, "")), 2, MS(100), MS(10_000), 3.0),
            MS(300)
        );
    }

    #[test]
    fn test_category_policy() {
        let policy = CategoryPolicy::new([ErrorCategory::ClientError], 2);

        assert!(policy.should_retry(&err(RetryableError::http(422, "")), 2));
        assert!(!policy.should_retry(&err(RetryableError::http(422, "")), 3));
        assert!(!policy.should_retry(&err(RetryableError::http(500, "")), 1));
    }
}
