//! Backoff computation.

use std::time::Duration;

/// Exponential delay before the retry following `attempt` (1-based).
///
/// `base_delay * backoff_factor^(attempt - 1)`, capped at `max_delay` and
/// truncated to whole milliseconds. Jitter is applied separately.
pub fn exponential_backoff(
    attempt: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = base_delay.as_millis() as f64 * backoff_factor.powi(exponent);
    let capped = raw.min(max_delay.as_millis() as f64);
    if capped.is_nan() || capped <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_millis(capped.floor() as u64)
}

/// Perturb a delay by up to `±delay * jitter_factor`, floored at zero.
pub fn apply_jitter(delay: Duration, jitter_factor: f64) -> Duration {
    jitter_with(delay, jitter_factor, rand_jitter())
}

/// Deterministic core of [`apply_jitter`]; `unit` is in `[-1, 1]`.
pub(crate) fn jitter_with(delay: Duration, jitter_factor: f64, unit: f64) -> Duration {
    let ms = delay.as_millis() as f64;
    let jittered = ms + ms * jitter_factor * unit;
    if jittered.is_nan() || jittered <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_millis(jittered.floor() as u64)
}

/// Generate a random jitter factor between -1.0 and 1.0.
fn rand_jitter() -> f64 {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    rng.gen_range(-1.0..=1.0)
}
