//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for SyncLane
///
/// Caller-visible engine outcomes such as "already running" or "client not
/// found" are modelled as values, not errors. This enum covers the cases where
/// an operation could not be carried out at all.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SyncLaneError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A compare-and-set write lost: the row was no longer in the expected
    /// state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Generic "try again later" signal surfaced when the state store stays
    /// unavailable after bounded retries.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncLaneError {
    /// Whether retrying the same operation shortly may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Network(_) | Self::Unavailable(_))
    }
}

/// Result type alias for SyncLane operations
pub type Result<T> = std::result::Result<T, SyncLaneError>;
