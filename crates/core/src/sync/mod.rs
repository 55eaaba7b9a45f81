//! Integration sync: ports, policies and the orchestrating engine.

pub mod engine;
pub mod events;
pub mod guard;
pub mod normalize;
pub mod ports;
pub mod retry_policy;
