//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Delay to wait after `failed_attempts` consecutive failures.
///
/// `base * multiplier^(failed_attempts - 1)`, capped at `max` when given, plus
/// up to `jitter` (fraction of the delay) of random extra time.
pub fn calculate_backoff(
    failed_attempts: u32,
    base: Duration,
    multiplier: f64,
    max: Option<Duration>,
    jitter: f64,
) -> Duration {
    if failed_attempts == 0 {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(failed_attempts - 1).unwrap_or(i32::MAX);
    let secs = base.as_secs_f64() * multiplier.powi(exponent);
    let mut delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
    if let Some(max) = max {
        delay = delay.min(max);
    }

    if jitter > 0.0 && !delay.is_zero() {
        let extra = rand::thread_rng().gen_range(0.0..jitter);
        delay = delay.saturating_add(delay.mul_f64(extra));
    }
    delay
}
