//! Wall-clock abstraction for testability

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Upper bound used when a `std` duration does not fit a `chrono` duration.
const MAX_CHRONO_MILLIS: i64 = 100 * 365 * 24 * 60 * 60 * 1000;

/// Trait for wall-clock reads so callers can be driven by a mock in tests.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds since the UNIX epoch.
    fn millis_since_epoch(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Real system clock implementation. Use this in production code.
///
/// ```
/// use synclane_common::time::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// assert!(clock.millis_since_epoch() > 0);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Convert a `std` duration into a `chrono` duration, saturating at a
/// century.
pub fn to_chrono_duration(duration: Duration) -> chrono::Duration {
    let millis = i64::try_from(duration.as_millis()).unwrap_or(MAX_CHRONO_MILLIS);
    chrono::Duration::milliseconds(millis.min(MAX_CHRONO_MILLIS))
}

/// Convert a `chrono` duration into a `std` duration. Negative values clamp to
/// zero.
pub fn from_chrono_duration(duration: chrono::Duration) -> Duration {
    duration.to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn duration_conversions_round_trip() {
        let std = Duration::from_millis(1_500);
        let chrono = to_chrono_duration(std);
        assert_eq!(chrono.num_milliseconds(), 1_500);
        assert_eq!(from_chrono_duration(chrono), std);
    }

    #[test]
    fn negative_chrono_duration_clamps_to_zero() {
        assert_eq!(from_chrono_duration(chrono::Duration::seconds(-5)), Duration::ZERO);
    }

    #[test]
    fn huge_std_duration_saturates() {
        let converted = to_chrono_duration(Duration::from_secs(u64::MAX));
        assert_eq!(converted.num_milliseconds(), MAX_CHRONO_MILLIS);
    }
}
