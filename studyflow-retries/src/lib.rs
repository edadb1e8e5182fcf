//! # studyflow-retries
//!
//! Retry engine and circuit breakers for StudyFlow's calls to unreliable
//! external services, chiefly the AI tutor endpoints.
//!
//! ## Core Concepts
//!
//! - **[`RetryEngine`]**: Runs an operation under a retry policy, keeps
//!   per-operation circuit breakers and aggregate metrics
//! - **[`RetryConfig`]**: Attempts, backoff, jitter, timeout, strategy
//! - **[`RetryStrategy`]**: Selects one of the built-in [`RetryPolicy`]s
//! - **[`RetryableError`]**: An explicitly classified failure
//! - **[`RetryResult`]**: Outcome plus attempt count, timing and history
//! - **[`RetryClient`]**: HTTP client with built-in retry support
//!
//! ## Strategies
//!
//! - [`RetryStrategy::NetworkTimeout`]: Network and timeout errors, 1.5x backoff
//! - [`RetryStrategy::RateLimit`]: Rate limit errors, honours `Retry-After`
//! - [`RetryStrategy::ServerError`]: Anything the category rules allow (default)
//! - [`RetryStrategy::NoRetry`]: Single attempt
//! - [`RetryStrategy::Custom`]: Caller-supplied policy
//!
//! ## Example
//!
//! ```ignore
//! use studyflow_retries::{RetryConfig, RetryEngine, RetryableError};
//!
//! let engine = RetryEngine::new();
//!
//! let result = engine
//!     .retry(&RetryConfig::default(), Some("ai-chat"), || async {
//!         // Your async operation
//!         Ok::<_, RetryableError>("success")
//!     })
//!     .await?;
//!
//! assert!(result.is_success());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod policy;
pub mod strategy;
pub mod transport;

// Re-exports
pub use backoff::{apply_jitter, exponential_backoff};
pub use circuit_breaker::{CircuitBreakerState, CircuitState};
pub use classify::{categorize_error, should_retry_error};
pub use config::{CircuitBreakerConfig, RetryConfig};
pub use error::{Cancelled, ConfigError, ErrorCategory, RetryError, RetryableError};
pub use executor::{AttemptInfo, RetryEngine, RetryResult};
pub use metrics::RetryMetrics;
pub use policy::{CategoryPolicy, RetryPolicy};
pub use strategy::RetryStrategy;
pub use transport::RetryClient;
pub use tokio_util::sync::CancellationToken;

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        CancellationToken, ErrorCategory, RetryConfig, RetryEngine, RetryError, RetryResult,
        RetryStrategy, RetryableError,
    };
}
