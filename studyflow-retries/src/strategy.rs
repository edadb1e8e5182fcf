//! Retry strategy selection.

use crate::policy::{
    DefaultPolicy, NetworkTimeoutPolicy, NoRetryPolicy, RateLimitPolicy, RetryPolicy,
    ServerErrorPolicy,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named retry strategy, selecting one of the built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetryStrategy {
    /// Transient connectivity problems, gentle 1.5x backoff.
    NetworkTimeout,
    /// Provider throttling; honours suggested delays.
    RateLimit,
    /// General purpose; retries whatever the category rules allow.
    #[default]
    ServerError,
    /// Never retry.
    NoRetry,
    /// Caller-supplied policy, falling back to the general one.
    Custom,
}

static NETWORK_TIMEOUT: NetworkTimeoutPolicy = NetworkTimeoutPolicy;
static RATE_LIMIT: RateLimitPolicy = RateLimitPolicy;
static SERVER_ERROR: ServerErrorPolicy = ServerErrorPolicy;
static NO_RETRY: NoRetryPolicy = NoRetryPolicy;
static DEFAULT: DefaultPolicy = DefaultPolicy;

impl RetryStrategy {
    /// The built-in policy for this strategy.
    pub fn policy(self) -> &'static dyn RetryPolicy {
        match self {
            Self::NetworkTimeout => &NETWORK_TIMEOUT,
            Self::RateLimit => &RATE_LIMIT,
            Self::ServerError => &SERVER_ERROR,
            Self::NoRetry => &NO_RETRY,
            Self::Custom => &DEFAULT,
        }
    }

    /// Upper-case strategy name.
    pub fn name(self) -> &'static str {
        match self {
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::RateLimit => "RATE_LIMIT",
            Self::ServerError => "SERVER_ERROR",
            Self::NoRetry => "NO_RETRY",
            Self::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
