//! Aggregate retry metrics.

use crate::error::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Counters accumulated by a [`RetryEngine`](crate::RetryEngine).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryMetrics {
    /// Attempts made across all calls.
    pub total_attempts: u64,
    /// Calls that ended in success.
    pub successful_operations: u64,
    /// Calls that ended in failure after running at least once.
    pub failed_operations: u64,
    /// Calls rejected by an open circuit breaker.
    pub circuit_breaker_trips: u64,
    /// Failed attempts per category. Every category is always present.
    pub errors_by_category: BTreeMap<ErrorCategory, u64>,
    /// When the counters were last zeroed.
    pub last_reset: DateTime<Utc>,
}

impl Default for RetryMetrics {
    fn default() -> Self {
        Self {
            total_attempts: 0,
            successful_operations: 0,
            failed_operations: 0,
            circuit_breaker_trips: 0,
            errors_by_category: ErrorCategory::ALL.iter().map(|c| (*c, 0)).collect(),
            last_reset: Utc::now(),
        }
    }
}

impl RetryMetrics {
    /// Fresh, zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Failed attempts recorded for one category.
    pub fn errors_for(&self, category: ErrorCategory) -> u64 {
        self.errors_by_category.get(&category).copied().unwrap_or(0)
    }

    /// Fraction of finished calls that succeeded, if any finished.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.successful_operations + self.failed_operations;
        (finished > 0).then(|| self.successful_operations as f64 / finished as f64)
    }

    pub(crate) fn record_error(&mut self, category: ErrorCategory) {
        *self.errors_by_category.entry(category).or_insert(0) += 1;
    }
}
