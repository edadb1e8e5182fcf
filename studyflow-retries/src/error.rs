//! Retry error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Closed set of failure categories the engine reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Connection-level failure.
    Network,
    /// Provider throttling or quota exhaustion.
    RateLimit,
    /// 5xx style failure on the remote side.
    ServerError,
    /// Malformed or rejected request.
    ClientError,
    /// Missing or invalid credentials.
    Authentication,
    /// Credentials lack the required permission.
    Authorization,
    /// The operation did not finish in time.
    Timeout,
    /// Nothing matched.
    Unknown,
}

impl ErrorCategory {
    /// Every category, in declaration order.
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::Network,
        ErrorCategory::RateLimit,
        ErrorCategory::ServerError,
        ErrorCategory::ClientError,
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::Timeout,
        ErrorCategory::Unknown,
    ];

    /// Map an HTTP status code to a category.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Authentication,
            403 => Self::Authorization,
            408 => Self::Timeout,
            429 => Self::RateLimit,
            500..=599 => Self::ServerError,
            400..=499 => Self::ClientError,
            _ => Self::Unknown,
        }
    }

    /// Whether errors of this category are retryable when nothing says otherwise.
    pub fn default_retryable(self) -> bool {
        match self {
            Self::Network | Self::Timeout | Self::ServerError | Self::RateLimit | Self::Unknown => {
                true
            }
            Self::Authentication | Self::Authorization | Self::ClientError => false,
        }
    }

    /// Upper-case name, as reported in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::RateLimit => "RATE_LIMIT",
            Self::ServerError => "SERVER_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::Authentication => "AUTHENTICATION",
            Self::Authorization => "AUTHORIZATION",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An explicitly classified error.
///
/// Operations return this when they know what went wrong; the category and
/// retryable flag are then taken at face value instead of being guessed
/// from the message.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RetryableError {
    message: String,
    category: ErrorCategory,
    retryable: bool,
    suggested_delay: Option<Duration>,
}

impl RetryableError {
    /// Create an error with the category's default retryability.
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            category,
            retryable: category.default_retryable(),
            suggested_delay: None,
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Network, message)
    }

    /// Create a rate limit error.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(ErrorCategory::RateLimit, "Rate limited");
        err.suggested_delay = retry_after;
        err
    }

    /// Create a timeout error.
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            ErrorCategory::Timeout,
            format!("Operation timed out after {}ms", after.as_millis()),
        )
    }

    /// Create an error from an HTTP status and body.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::from_status(status),
            format!("HTTP error {status}: {}", body.into()),
        )
    }

    /// Override whether this error may be retried.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a delay hint, such as a parsed `Retry-After` header.
    #[must_use]
    pub fn with_suggested_delay(mut self, delay: Duration) -> Self {
        self.suggested_delay = Some(delay);
        self
    }

    /// The error's category.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Whether this error may be retried.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// The delay hint, if any.
    pub fn suggested_delay(&self) -> Option<Duration> {
        self.suggested_delay
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Any error an operation can fail with.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Explicitly classified error.
    #[error(transparent)]
    Retryable(#[from] RetryableError),

    /// The call was rejected because the circuit breaker is open.
    #[error("Circuit breaker is open for '{operation_id}'")]
    CircuitOpen {
        /// Operation the breaker belongs to.
        operation_id: String,
    },

    /// Opaque error, classified from its message.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RetryError {
    /// Build an opaque error from a message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::Other(anyhow::Error::msg(message))
    }

    /// The explicit classification, if the error carries one.
    ///
    /// Looks through the `anyhow` chain so a wrapped `RetryableError`
    /// still counts as explicit.
    pub fn as_retryable(&self) -> Option<&RetryableError> {
        match self {
            Self::Retryable(err) => Some(err),
            Self::CircuitOpen { .. } => None,
            Self::Other(err) => err.chain().find_map(|e| e.downcast_ref::<RetryableError>()),
        }
    }

    /// Category of this error.
    pub fn category(&self) -> ErrorCategory {
        crate::classify::categorize_error(self)
    }

    /// Delay hint carried by an explicit classification.
    pub fn suggested_delay(&self) -> Option<Duration> {
        self.as_retryable().and_then(RetryableError::suggested_delay)
    }
}

/// Returned by `retry` when the caller's cancellation token fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Retry cancelled after {attempts} attempt(s)")]
pub struct Cancelled {
    /// Attempts that completed before cancellation.
    pub attempts: u32,
}

/// Invalid retry or circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `max_attempts` was zero.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    /// `max_delay` was smaller than `base_delay`.
    #[error("max_delay ({max_delay:?}) is smaller than base_delay ({base_delay:?})")]
    DelayRange {
        /// Configured base delay.
        base_delay: Duration,
        /// Configured max delay.
        max_delay: Duration,
    },

    /// `backoff_factor` was not a positive finite number.
    #[error("backoff_factor must be positive and finite, got {0}")]
    BackoffFactor(f64),

    /// `jitter_factor` was outside `[0, 1]`.
    #[error("jitter_factor must be within [0, 1], got {0}")]
    JitterFactor(f64),

    /// A circuit breaker threshold was zero.
    #[error("circuit breaker {0} must be at least 1")]
    Threshold(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ErrorCategory::from_status(401), ErrorCategory::Authentication);
        assert_eq!(ErrorCategory::from_status(403), ErrorCategory::Authorization);
        assert_eq!(ErrorCategory::from_status(408), ErrorCategory::Timeout);
        assert_eq!(ErrorCategory::from_status(429), ErrorCategory::RateLimit);
        assert_eq!(ErrorCategory::from_status(503), ErrorCategory::ServerError);
        assert_eq!(ErrorCategory::from_status(422), ErrorCategory::ClientError);
        assert_eq!(ErrorCategory::from_status(302), ErrorCategory::Unknown);
    }

    #[test]
    fn test_retryable_defaults() {
        assert!(RetryableError::rate_limited(None).is_retryable());
        assert!(RetryableError::timeout(Duration::from_millis(50)).is_retryable());
        assert!(RetryableError::http(500, "error").is_retryable());
        assert!(!RetryableError::http(400, "bad request").is_retryable());
        assert!(!RetryableError::http(401, "nope").is_retryable());
    }

    #[test]
    fn test_retryable_override() {
        let err = RetryableError::http(400, "bad request").with_retryable(true);
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::ClientError);
    }

    #[test]
    fn test_suggested_delay() {
        let err = RetryableError::rate_limited(Some(Duration::from_secs(5)));
        assert_eq!(err.suggested_delay(), Some(Duration::from_secs(5)));

        let err = RetryableError::network("reset");
        assert_eq!(err.suggested_delay(), None);
    }

    #[test]
    fn test_wrapped_retryable_is_found() {
        let inner = RetryableError::network("socket closed");
        let err = RetryError::Other(anyhow::Error::new(inner).context("loading chat history"));
        let found = err.as_retryable().map(RetryableError::category);
        assert_eq!(found, Some(ErrorCategory::Network));
    }

    #[test]
    fn test_timeout_message() {
        let err = RetryableError::timeout(Duration::from_millis(50));
        assert_eq!(err.to_string(), "Operation timed out after 50ms");
    }

    #[test]
    fn test_category_serializes_upper_case() {
        let json = serde_json::to_string(&ErrorCategory::RateLimit).unwrap();
        assert_eq!(json, "\"RATE_LIMIT\"");
    }
}
