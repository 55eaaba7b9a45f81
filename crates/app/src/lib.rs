//! # SyncLane Application
//!
//! Composition root: wires the infrastructure adapters into the sync engine
//! and exposes the handlers behind the `synclane` command-line tool.

pub mod commands;
pub mod context;
pub mod logging;

pub use context::AppContext;
