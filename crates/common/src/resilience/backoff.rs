//! Exponential backoff calculation

use std::time::Duration;

/// Exponential backoff: `initial_delay * base^attempt`, capped at `max_delay`.
///
/// ```
/// use std::time::Duration;
///
/// use synclane_common::resilience::ExponentialBackoff;
///
/// let backoff =
///     ExponentialBackoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(1));
/// assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
/// assert_eq!(backoff.calculate_delay(3), Duration::from_millis(800));
/// assert_eq!(backoff.calculate_delay(10), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    base: f64,
    max_delay: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff. A `base` below 1.0 is treated as 1.0 so delays never
    /// shrink between attempts.
    pub fn new(initial_delay: Duration, base: f64, max_delay: Duration) -> Self {
        let base = if base.is_finite() && base >= 1.0 { base } else { 1.0 };
        Self { initial_delay, base, max_delay: max_delay.max(initial_delay) }
    }

    /// Delay before the first retry.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound on any single delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before retry number `attempt` (zero-based: `0` is the first
    /// retry).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.base.powi(exponent);
        let max_ms = self.max_delay.as_millis() as f64;

        if !delay_ms.is_finite() || delay_ms >= max_ms {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64)
    }
}
