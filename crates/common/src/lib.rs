//! Modular common utilities shared across SyncLane crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: clock abstraction, backoff math
//! - `test-utils`: controllable clock for deterministic tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(any(feature = "foundation", test))]
pub mod resilience;
#[cfg(any(feature = "foundation", test))]
pub mod time;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", test))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(any(feature = "foundation", test))]
pub use resilience::ExponentialBackoff;
#[cfg(any(feature = "foundation", test))]
pub use time::{Clock, SystemClock};
