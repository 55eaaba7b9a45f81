//! Scheduler error types

use synclane_domain::SyncLaneError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Worker is already running
    #[error("Retry worker already running")]
    AlreadyRunning,

    /// Worker is not running
    #[error("Retry worker not running")]
    NotRunning,

    /// Operation timed out
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Task join failed
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let synclane_err = match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                SyncLaneError::InvalidInput(err.to_string())
            }
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                SyncLaneError::Internal(err.to_string())
            }
        };
        InfraError(synclane_err)
    }
}

impl From<SchedulerError> for SyncLaneError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_errors_map_to_invalid_input() {
        let err: SyncLaneError = SchedulerError::AlreadyRunning.into();
        assert!(matches!(err, SyncLaneError::InvalidInput(_)));

        let err: SyncLaneError = SchedulerError::Timeout { seconds: 5 }.into();
        assert!(matches!(err, SyncLaneError::Internal(ref msg) if msg.contains("5s")));
    }
}
