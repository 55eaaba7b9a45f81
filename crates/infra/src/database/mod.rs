//! Database implementations

pub mod client_repository;
pub mod lease_repository;
pub mod manager;
mod repository;
pub mod sync_state_repository;

pub use client_repository::*;
pub use lease_repository::*;
pub use manager::*;
pub use sync_state_repository::*;
