//! Retry decision for failed attempts
//!
//! A pure function of the attempt number, failure kind and the cycle's
//! elapsed time. The constants come from [`RetryConfig`]; nothing here reads
//! a clock.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use synclane_common::resilience::ExponentialBackoff;
use synclane_common::time::from_chrono_duration;
use synclane_domain::{FailureKind, RetryConfig};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    RetryAfter(Duration),
    GiveUp(GiveUpReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The failure was classified as fatal.
    Fatal,
    MaxAttempts,
    /// The next attempt would start outside the cycle's time window.
    MaxElapsed,
}

impl fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fatal => f.write_str("fatal failure"),
            Self::MaxAttempts => f.write_str("maximum attempts reached"),
            Self::MaxElapsed => f.write_str("retry window exhausted"),
        }
    }
}

/// Exponential backoff bounded by attempt count and total elapsed time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    backoff: ExponentialBackoff,
    max_attempts: u32,
    max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build the policy from the `retry` configuration section.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            backoff: ExponentialBackoff::new(
                config.base_delay(),
                config.multiplier,
                config.max_delay(),
            ),
            max_attempts: config.max_attempts.max(1),
            max_elapsed: config.max_elapsed(),
        }
    }

    /// Decide what follows attempt `attempt_number` (1-based) of a cycle that
    /// started at `first_attempt_at`.
    ///
    /// An upstream `Retry-After` hint lengthens the backoff up to the maximum
    /// delay. The window check applies to the hinted delay.
    pub fn next_action(
        &self,
        attempt_number: u32,
        kind: FailureKind,
        first_attempt_at: DateTime<Utc>,
        now: DateTime<Utc>,
        hint: Option<Duration>,
    ) -> NextAction {
        if kind == FailureKind::Fatal {
            return NextAction::GiveUp(GiveUpReason::Fatal);
        }

        if attempt_number >= self.max_attempts {
            return NextAction::GiveUp(GiveUpReason::MaxAttempts);
        }

        let backoff = self.backoff.calculate_delay(attempt_number.saturating_sub(1));
        let delay = self.apply_hint(backoff, hint);
        let elapsed = from_chrono_duration(now - first_attempt_at);
        if elapsed.saturating_add(delay) > self.max_elapsed {
            return NextAction::GiveUp(GiveUpReason::MaxElapsed);
        }

        NextAction::RetryAfter(delay)
    }

    fn apply_hint(&self, delay: Duration, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) => delay.max(hint).min(self.backoff.max_delay().max(delay)),
            None => delay,
        }
    }
}
