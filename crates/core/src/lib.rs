//! # SyncLane Core
//!
//! Pure business logic layer - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for state, leases, the external gateway
//!   and deferred retries
//! - The retry policy and payload normalization
//! - The idempotency guard and the sync engine state machine
//!
//! ## Architecture Principles
//! - Only depends on `synclane-common` and `synclane-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod sync;

// Re-export specific items to avoid ambiguity
pub use sync::engine::SyncEngine;
pub use sync::events::TracingEventSink;
pub use sync::guard::IdempotencyGuard;
pub use sync::normalize::{normalize, NormalizationError};
pub use sync::ports::{
    ClientDirectory, CredentialResolver, ExternalGateway, GatewayFailure, GatewayOutcome,
    GatewayRequest, GatewayResponse, LeaseStore, RetryScheduler, SyncEventSink, SyncStateStore,
};
pub use sync::retry_policy::{GiveUpReason, NextAction, RetryPolicy};
