//! Test helpers shared across SyncLane crates.
//!
//! Enabled with the `test-utils` feature.

pub mod time;

pub use time::MockClock;
