//! # SyncLane Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite stores for clients, sync attempts and leases
//! - The HTTP gateway adapter for clients' external systems
//! - Credential resolvers
//! - The deferred retry worker
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `synclane-core`
//! - Depends on `synclane-domain` and `synclane-core`
//! - Contains all "impure" code (I/O, timers, environment)

pub mod config;
pub mod credentials;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod scheduling;

// Re-export commonly used items
pub use credentials::{EnvCredentialResolver, StaticCredentialResolver};
pub use database::*;
pub use errors::InfraError;
pub use http::*;
pub use integrations::*;
pub use scheduling::{retry_queue, RetryInbox, RetryQueue, RetryWorker, RetryWorkerConfig};
