//! Per-operation circuit breakers.
//!
//! Breaker records are created on the first failure for an operation id and
//! live until they are reset. Transitions out of OPEN happen lazily, when
//! the next call for that id checks in.

use crate::config::CircuitBreakerConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tokio::time::Instant;
use tracing::info;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    #[default]
    Closed,
    /// Calls are rejected without running.
    Open,
    /// Trial calls are let through to probe recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Snapshot of one operation's breaker.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CircuitBreakerState {
    /// Current state.
    pub state: CircuitState,
    /// Failures counted towards opening.
    pub failure_count: u32,
    /// Successful trials while half-open.
    pub success_count: u32,
    /// Monotonic time of the last recorded failure.
    #[serde(skip)]
    pub last_failure: Option<Instant>,
    /// Wall-clock time of the last recorded failure.
    pub last_failure_at: Option<DateTime<Utc>>,
}

impl CircuitBreakerState {
    fn note_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(Instant::now());
        self.last_failure_at = Some(Utc::now());
    }

    fn open_elapsed(&self, timeout: std::time::Duration) -> bool {
        self.last_failure
            .map_or(true, |at| Instant::now().duration_since(at) > timeout)
    }
}

/// Breakers keyed by operation id.
#[derive(Debug, Default)]
pub(crate) struct CircuitBreakers {
    config: CircuitBreakerConfig,
    states: Mutex<HashMap<String, CircuitBreakerState>>,
}

impl CircuitBreakers {
    pub(crate) fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a call may proceed. Moves an expired OPEN breaker to HALF_OPEN.
    pub(crate) fn try_acquire(&self, operation_id: &str) -> bool {
        let mut states = self.states.lock();
        let Some(breaker) = states.get_mut(operation_id) else {
            return true;
        };

        match breaker.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open if breaker.open_elapsed(self.config.timeout) => {
                breaker.state = CircuitState::HalfOpen;
                breaker.success_count = 0;
                info!(operation_id, "Circuit breaker half-open, allowing trial call");
                true
            }
            CircuitState::Open => false,
        }
    }

    pub(crate) fn record_success(&self, operation_id: &str) {
        let mut states = self.states.lock();
        let Some(breaker) = states.get_mut(operation_id) else {
            return;
        };

        match breaker.state {
            CircuitState::Closed => {
                breaker.failure_count = breaker.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                breaker.success_count += 1;
                if breaker.success_count >= self.config.success_threshold {
                    breaker.state = CircuitState::Closed;
                    breaker.failure_count = 0;
                    breaker.success_count = 0;
                    info!(operation_id, "Circuit breaker closed");
                }
            }
            // A call admitted before the breaker opened.
            CircuitState::Open => {}
        }
    }

    pub(crate) fn record_failure(&self, operation_id: &str) {
        let mut states = self.states.lock();
        let breaker = states.entry(operation_id.to_string()).or_default();
        breaker.note_failure();

        match breaker.state {
            CircuitState::Closed if breaker.failure_count >= self.config.failure_threshold => {
                breaker.state = CircuitState::Open;
                info!(
                    operation_id,
                    failure_count = breaker.failure_count,
                    "Circuit breaker opened"
                );
            }
            CircuitState::HalfOpen => {
                breaker.state = CircuitState::Open;
                breaker.success_count = 0;
                info!(operation_id, "Trial call failed, circuit breaker re-opened");
            }
            CircuitState::Closed | CircuitState::Open => {}
        }
    }

    pub(crate) fn reset(&self, operation_id: &str) {
        if self.states.lock().remove(operation_id).is_some() {
            info!(operation_id, "Circuit breaker reset");
        }
    }

    pub(crate) fn status(&self, operation_id: &str) -> Option<CircuitBreakerState> {
        self.states.lock().get(operation_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breakers() -> CircuitBreakers {
        CircuitBreakers::new(CircuitBreakerConfig::default())
    }

    #[test]
    fn test_unknown_operation_is_allowed() {
        let b = breakers();
        assert!(b.try_acquire("ai-chat"));
        assert!(b.status("ai-chat").is_none());
    }

    #[test]
    fn test_success_without_record_is_noop() {
        let b = breakers();
        b.record_success("ai-chat");
        assert!(b.status("ai-chat").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_at_threshold() {
        let b = breakers();
        for _ in 0..4 {
            b.record_failure("ai-chat");
        }
        assert_eq!(b.status("ai-chat").unwrap().state, CircuitState::Closed);

        b.record_failure("ai-chat");
        let status = b.status("ai-chat").unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.failure_count, 5);
        assert!(!b.try_acquire("ai-chat"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_gives_recovery_credit() {
        let b = breakers();
        for _ in 0..4 {
            b.record_failure("ai-chat");
        }
        b.record_success("ai-chat");
        b.record_success("ai-chat");
        assert_eq!(b.status("ai-chat").unwrap().failure_count, 2);

        for _ in 0..5 {
            b.record_success("ai-chat");
        }
        assert_eq!(b.status("ai-chat").unwrap().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_after_timeout() {
        let b = breakers();
        for _ in 0..5 {
            b.record_failure("ai-chat");
        }

        tokio::time::advance(Duration::from_millis(60_000)).await;
        assert!(!b.try_acquire("ai-chat"), "timeout must be strictly exceeded");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(b.try_acquire("ai-chat"));
        assert_eq!(b.status("ai-chat").unwrap().state, CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_closes_after_successes() {
        let b = breakers();
        for _ in 0..5 {
            b.record_failure("ai-chat");
        }
        tokio::time::advance(Duration::from_millis(60_001)).await;
        assert!(b.try_acquire("ai-chat"));

        b.record_success("ai-chat");
        assert_eq!(b.status("ai-chat").unwrap().state, CircuitState::HalfOpen);
        b.record_success("ai-chat");

        let status = b.status("ai-chat").unwrap();
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let b = breakers();
        for _ in 0..5 {
            b.record_failure("ai-chat");
        }
        tokio::time::advance(Duration::from_millis(60_001)).await;
        assert!(b.try_acquire("ai-chat"));

        b.record_success("ai-chat");
        b.record_failure("ai-chat");

        let status = b.status("ai-chat").unwrap();
        assert_eq!(status.state, CircuitState::Open);
        assert_eq!(status.success_count, 0);
        assert!(!b.try_acquire("ai-chat"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_low_threshold_count() {
        let b = CircuitBreakers::new(CircuitBreakerConfig::new().failure_threshold(1));
        b.record_failure("ai-chat");
        tokio::time::advance(Duration::from_millis(60_001)).await;
        assert!(b.try_acquire("ai-chat"));

        b.record_failure("ai-chat");
        assert_eq!(b.status("ai-chat").unwrap().state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_below_threshold() {
        let b = CircuitBreakers::new(CircuitBreakerConfig::new().failure_threshold(3));
        for _ in 0..3 {
            b.record_failure("ai-chat");
        }
        tokio::time::advance(Duration::from_millis(60_001)).await;
        assert!(b.try_acquire("ai-chat"));

        b.states.lock().get_mut("ai-chat").unwrap().failure_count = 0;
        b.record_failure("ai-chat");

        let status = b.status("ai-chat").unwrap();
        assert_eq!(status.failure_count, 1);
        assert_eq!(status.state, CircuitState::Open);
        assert!(!b.try_acquire("ai-chat"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_and_isolation() {
        let b = breakers();
        for _ in 0..5 {
            b.record_failure("ai-chat");
        }
        assert!(b.try_acquire("flashcards"));

        b.reset("ai-chat");
        assert!(b.status("ai-chat").is_none());
        assert!(b.try_acquire("ai-chat"));
    }
}
