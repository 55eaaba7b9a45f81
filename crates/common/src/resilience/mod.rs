//! Resilience primitives.
//!
//! Only the delay math lives here; deciding *whether* to retry is a business
//! rule owned by `synclane-core`.

pub mod backoff;

pub use backoff::ExponentialBackoff;
