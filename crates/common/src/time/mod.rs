//! Time utilities and abstractions
//!
//! - **Clock abstractions**: [`Clock`] and the production [`SystemClock`]
//!   (the controllable `MockClock` lives in `testing`)
//! - Conversions between `std::time::Duration` and `chrono::Duration`
//!
//! Wall-clock time is modelled as `DateTime<Utc>` because leases and retry
//! deadlines are persisted and compared across processes.

pub mod clock;

pub use clock::{from_chrono_duration, to_chrono_duration, Clock, SystemClock};
