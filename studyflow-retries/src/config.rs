//! Retry configuration.

use crate::error::ConfigError;
use crate::policy::RetryPolicy;
use crate::strategy::RetryStrategy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior.
///
/// Start from [`RetryConfig::default`] (or a preset) and override fields with
/// the builder methods. Deserializing a partial document has the same
/// effect: missing fields keep their defaults.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(rename = "base_delay_ms", with = "millis")]
    pub base_delay: Duration,
    /// Upper bound for any computed delay.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_factor: f64,
    /// Whether to randomize delays.
    pub jitter_enabled: bool,
    /// Relative jitter amplitude (0.0 to 1.0).
    pub jitter_factor: f64,
    /// Retry strategy.
    pub strategy: RetryStrategy,
    /// Per-attempt timeout.
    #[serde(rename = "timeout_ms", with = "opt_millis")]
    pub timeout: Option<Duration>,
    /// Token that aborts the whole retry loop.
    #[serde(skip)]
    pub cancellation: Option<CancellationToken>,
    /// Policy used by [`RetryStrategy::Custom`].
    #[serde(skip)]
    pub custom_policy: Option<Arc<dyn RetryPolicy>>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
            jitter_enabled: true,
            jitter_factor: 0.1,
            strategy: RetryStrategy::ServerError,
            timeout: Some(Duration::from_millis(30_000)),
            cancellation: None,
            custom_policy: None,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("jitter_enabled", &self.jitter_enabled)
            .field("jitter_factor", &self.jitter_factor)
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout)
            .field("cancellable", &self.cancellation.is_some())
            .field("custom_policy", &self.custom_policy.is_some())
            .finish()
    }
}

impl RetryConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggressive retries for flaky connectivity.
    pub fn network_aggressive() -> Self {
        Self::new()
            .max_attempts(5)
            .base_delay(Duration::from_millis(500))
            .max_delay(Duration::from_millis(10_000))
            .backoff_factor(1.5)
            .jitter(0.1)
            .strategy(RetryStrategy::NetworkTimeout)
            .timeout(Duration::from_millis(15_000))
    }

    /// Slow, patient retries for throttled providers.
    pub fn rate_limit_conservative() -> Self {
        Self::new()
            .max_attempts(8)
            .base_delay(Duration::from_millis(2000))
            .max_delay(Duration::from_millis(60_000))
            .backoff_factor(2.0)
            .jitter(0.2)
            .strategy(RetryStrategy::RateLimit)
            .timeout(Duration::from_millis(30_000))
    }

    /// The general-purpose default.
    pub fn server_error_standard() -> Self {
        Self::new()
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new()
            .max_attempts(1)
            .base_delay(Duration::ZERO)
            .max_delay(Duration::ZERO)
            .no_jitter()
            .strategy(RetryStrategy::NoRetry)
    }

    /// Set max attempts.
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay.
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the max delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff factor.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Enable jitter with the given factor.
    pub fn jitter(mut self, factor: f64) -> Self {
        self.jitter_enabled = true;
        self.jitter_factor = factor;
        self
    }

    /// Disable jitter.
    pub fn no_jitter(mut self) -> Self {
        self.jitter_enabled = false;
        self
    }

    /// Set the strategy.
    pub fn strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let attempts run without a timeout.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Attach a cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Use a custom policy. Also switches the strategy to [`RetryStrategy::Custom`].
    pub fn custom_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.custom_policy = Some(Arc::new(policy));
        self.strategy = RetryStrategy::Custom;
        self
    }

    /// The policy this config resolves to.
    pub fn policy(&self) -> &dyn RetryPolicy {
        match (self.strategy, &self.custom_policy) {
            (RetryStrategy::Custom, Some(policy)) => policy.as_ref(),
            (strategy, _) => strategy.policy(),
        }
    }

    /// Check the config for values the engine would have to correct.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::DelayRange {
                base_delay: self.base_delay,
                max_delay: self.max_delay,
            });
        }
        if !(self.backoff_factor.is_finite() && self.backoff_factor > 0.0) {
            return Err(ConfigError::BackoffFactor(self.backoff_factor));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::JitterFactor(self.jitter_factor));
        }
        Ok(())
    }

    /// A copy with every invalid value clamped into range.
    pub fn normalized(&self) -> Self {
        let mut config = self.clone();
        config.max_attempts = config.max_attempts.max(1);
        config.max_delay = config.max_delay.max(config.base_delay);
        if !(config.backoff_factor.is_finite() && config.backoff_factor > 0.0) {
            config.backoff_factor = RetryConfig::default().backoff_factor;
        }
        config.jitter_factor = if config.jitter_factor.is_nan() {
            0.0
        } else {
            config.jitter_factor.clamp(0.0, 1.0)
        };
        config
    }
}

/// Configuration for per-operation circuit breakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failed calls that open the breaker.
    pub failure_threshold: u32,
    /// Successful trial calls that close it again.
    pub success_threshold: u32,
    /// How long the breaker stays open before allowing a trial.
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_millis(60_000),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new default config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the failure threshold.
    pub fn failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Set the success threshold.
    pub fn success_threshold(mut self, n: u32) -> Self {
        self.success_threshold = n;
        self
    }

    /// Set the open-state timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Threshold("failure_threshold"));
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::Threshold("success_threshold"));
        }
        Ok(())
    }

    /// A copy with both thresholds raised to at least 1.
    pub fn normalized(&self) -> Self {
        Self {
            failure_threshold: self.failure_threshold.max(1),
            success_threshold: self.success_threshold.max(1),
            timeout: self.timeout,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(d).map(|ms| ms.map(Duration::from_millis))
    }
}
