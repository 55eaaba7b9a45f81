//! Controllable clock for deterministic tests
//!
//! ```
//! use std::time::Duration;
//!
//! use synclane_common::testing::MockClock;
//! use synclane_common::time::Clock;
//!
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!((clock.now() - start).num_seconds(), 5);
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::time::{to_chrono_duration, Clock};

/// Mock clock for deterministic testing.
///
/// Clones share the same underlying instant, so a clock handed to the code
/// under test can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a clock pinned to a fixed, readable instant
    /// (2024-01-01T00:00:00Z).
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);
        Self::at(start)
    }

    /// Create a clock pinned to `instant`.
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self { current: Arc::new(Mutex::new(instant)) }
    }

    /// Simulate time passing without actually waiting.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock();
        *current += to_chrono_duration(duration);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock() = instant;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}
