//! Retry engine for running operations with retries and circuit breaking.

use crate::backoff::apply_jitter;
use crate::circuit_breaker::{CircuitBreakerState, CircuitBreakers};
use crate::config::{CircuitBreakerConfig, RetryConfig};
use crate::error::{Cancelled, ErrorCategory, RetryError, RetryableError};
use crate::metrics::RetryMetrics;
use crate::strategy::RetryStrategy;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Information about a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptInfo {
    /// Attempt number (1-indexed).
    pub attempt: u32,
    /// Whether it succeeded.
    pub success: bool,
    /// Error message if failed.
    pub error: Option<String>,
    /// Error category if failed.
    pub category: Option<ErrorCategory>,
    /// Time waited after this attempt, before the next one.
    pub wait_time: Duration,
}

/// Outcome of a [`RetryEngine::retry`] call.
#[derive(Debug)]
pub struct RetryResult<T> {
    /// The data on success, the last error otherwise.
    pub outcome: Result<T, RetryError>,
    /// Attempts made. Zero when the circuit breaker rejected the call.
    pub attempts: u32,
    /// Wall time from the call to its result, including waits.
    pub total_time: Duration,
    /// Strategy that drove the retries.
    pub strategy: RetryStrategy,
    /// Whether the call was rejected by an open circuit breaker.
    pub circuit_breaker_triggered: bool,
    /// Per-attempt history.
    pub history: Vec<AttemptInfo>,
}

impl<T> RetryResult<T> {
    /// Whether the operation eventually succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The data, if the operation succeeded.
    pub fn data(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// The last error, if the operation failed.
    pub fn last_error(&self) -> Option<&RetryError> {
        self.outcome.as_ref().err()
    }

    /// Category of the last error.
    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.last_error().map(RetryError::category)
    }

    /// Name of the strategy used.
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Drop the bookkeeping and keep the outcome.
    pub fn into_result(self) -> Result<T, RetryError> {
        self.outcome
    }
}

#[derive(Debug, Default)]
struct EngineInner {
    breakers: CircuitBreakers,
    metrics: Mutex<RetryMetrics>,
}

/// Runs operations under a retry policy, with per-operation circuit breakers
/// and aggregate metrics.
///
/// Clones share circuit breaker state and metrics.
///
/// # Example
///
/// ```ignore
/// use studyflow_retries::{RetryConfig, RetryEngine};
///
/// let engine = RetryEngine::new();
/// let result = engine
///     .retry(&RetryConfig::network_aggressive(), Some("ai-chat"), || async {
///         tutor.ask("What is a derivative?").await
///     })
///     .await?;
///
/// if result.circuit_breaker_triggered {
///     // tutor temporarily unavailable
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryEngine {
    inner: Arc<EngineInner>,
}

impl RetryEngine {
    /// Create an engine with default circuit breaker settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom circuit breaker settings.
    pub fn with_circuit_breaker(config: CircuitBreakerConfig) -> Self {
        if let Err(err) = config.validate() {
            warn!(error = %err, "Invalid circuit breaker config, clamping to valid range");
        }
        Self {
            inner: Arc::new(EngineInner {
                breakers: CircuitBreakers::new(config.normalized()),
                metrics: Mutex::new(RetryMetrics::new()),
            }),
        }
    }

    /// Circuit breaker settings in use.
    pub fn circuit_breaker_config(&self) -> &CircuitBreakerConfig {
        self.inner.breakers.config()
    }

    /// Execute an operation with retries.
    ///
    /// Failures of the operation never surface as `Err`: they end up in
    /// [`RetryResult::outcome`]. The only `Err` is [`Cancelled`], returned as
    /// soon as the config's cancellation token fires.
    ///
    /// Passing an `operation_id` enables circuit breaking for that id.
    /// A timed-out attempt's future is dropped, but work it already handed
    /// off (a sent request, a spawned task) may still complete.
    pub async fn retry<F, Fut, T, E>(
        &self,
        config: &RetryConfig,
        operation_id: Option<&str>,
        operation: F,
    ) -> Result<RetryResult<T>, Cancelled>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RetryError>,
    {
        let start = Instant::now();
        if let Err(err) = config.validate() {
            warn!(error = %err, "Invalid retry config, clamping to valid range");
        }
        let config = config.normalized();
        let policy = config.policy();
        let mut history = Vec::new();

        if let Some(id) = operation_id {
            if !self.inner.breakers.try_acquire(id) {
                self.inner.metrics.lock().circuit_breaker_trips += 1;
                warn!(operation_id = id, "Circuit breaker open, rejecting call");
                return Ok(RetryResult {
                    outcome: Err(RetryError::CircuitOpen {
                        operation_id: id.to_string(),
                    }),
                    attempts: 0,
                    total_time: start.elapsed(),
                    strategy: config.strategy,
                    circuit_breaker_triggered: true,
                    history,
                });
            }
        }

        let mut attempt = 0;
        let last_error = loop {
            attempt += 1;

            debug!(
                attempt,
                max_attempts = config.max_attempts,
                strategy = %config.strategy,
                operation_id,
                "Executing retry attempt"
            );

            let Some(outcome) = run_attempt(&config, &operation).await else {
                debug!(attempt, operation_id, "Retry cancelled during attempt");
                return Err(Cancelled {
                    attempts: attempt - 1,
                });
            };
            self.inner.metrics.lock().total_attempts += 1;

            let error = match outcome {
                Ok(data) => {
                    if let Some(id) = operation_id {
                        self.inner.breakers.record_success(id);
                    }
                    self.inner.metrics.lock().successful_operations += 1;
                    history.push(AttemptInfo {
                        attempt,
                        success: true,
                        error: None,
                        category: None,
                        wait_time: Duration::ZERO,
                    });
                    return Ok(RetryResult {
                        outcome: Ok(data),
                        attempts: attempt,
                        total_time: start.elapsed(),
                        strategy: config.strategy,
                        circuit_breaker_triggered: false,
                        history,
                    });
                }
                Err(error) => error,
            };

            let category = error.category();
            self.inner.metrics.lock().record_error(category);

            if attempt >= config.max_attempts || !policy.should_retry(&error, attempt) {
                warn!(
                    attempt,
                    category = %category,
                    error = %error,
                    operation_id,
                    "Retry exhausted or error not retryable"
                );
                history.push(AttemptInfo {
                    attempt,
                    success: false,
                    error: Some(error.to_string()),
                    category: Some(category),
                    wait_time: Duration::ZERO,
                });
                break error;
            }

            let mut wait = policy.calculate_delay(
                &error,
                attempt,
                config.base_delay,
                config.max_delay,
                config.backoff_factor,
            );
            if config.jitter_enabled {
                wait = apply_jitter(wait, config.jitter_factor);
            }

            history.push(AttemptInfo {
                attempt,
                success: false,
                error: Some(error.to_string()),
                category: Some(category),
                wait_time: wait,
            });

            debug!(
                attempt,
                wait_ms = wait.as_millis() as u64,
                category = %category,
                error = %error,
                "Waiting before retry"
            );

            if !pause(&config, wait).await {
                debug!(attempt, operation_id, "Retry cancelled while waiting");
                return Err(Cancelled { attempts: attempt });
            }
        };

        if let Some(id) = operation_id {
            self.inner.breakers.record_failure(id);
        }
        self.inner.metrics.lock().failed_operations += 1;

        Ok(RetryResult {
            outcome: Err(last_error),
            attempts: attempt,
            total_time: start.elapsed(),
            strategy: config.strategy,
            circuit_breaker_triggered: false,
            history,
        })
    }

    /// Snapshot of the aggregate metrics.
    pub fn stats(&self) -> RetryMetrics {
        self.inner.metrics.lock().clone()
    }

    /// Zero all metrics.
    pub fn reset_metrics(&self) {
        *self.inner.metrics.lock() = RetryMetrics::new();
        debug!("Retry metrics reset");
    }

    /// Forget the circuit breaker for an operation id.
    pub fn reset_circuit_breaker(&self, operation_id: &str) {
        self.inner.breakers.reset(operation_id);
    }

    /// Current circuit breaker state for an operation id, if one exists.
    pub fn circuit_breaker_status(&self, operation_id: &str) -> Option<CircuitBreakerState> {
        self.inner.breakers.status(operation_id)
    }
}

/// Run one attempt under the timeout. `None` means cancelled.
async fn run_attempt<F, Fut, T, E>(
    config: &RetryConfig,
    operation: &F,
) -> Option<Result<T, RetryError>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<RetryError>,
{
    let attempt = async {
        match config.timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(Into::into),
                Err(_) => Err(RetryableError::timeout(limit).into()),
            },
            None => operation().await.map_err(Into::into),
        }
    };

    match &config.cancellation {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = attempt => Some(result),
        },
        None => Some(attempt.await),
    }
}

/// Sleep between attempts. `false` means cancelled.
async fn pause(config: &RetryConfig, wait: Duration) -> bool {
    match &config.cancellation {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = sleep(wait) => true,
        },
        None => {
            if !wait.is_zero() {
                sleep(wait).await;
            }
            true
        }
    }
}
