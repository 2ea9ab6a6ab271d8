//! Scheduler error types

use servertide_domain::ServerTideError;
use thiserror::Error;

use crate::errors::InfraError;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Scheduler is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// Scheduler is not running
    #[error("Scheduler not running")]
    NotRunning,

    /// The loop task panicked or was aborted
    #[error("Task join failed: {0}")]
    TaskJoinFailed(String),

    /// The loop stopped itself on a fatal error
    #[error("Reconciliation loop aborted: {0}")]
    Aborted(ServerTideError),
}

impl From<tokio::task::JoinError> for SchedulerError {
    fn from(err: tokio::task::JoinError) -> Self {
        SchedulerError::TaskJoinFailed(err.to_string())
    }
}

impl From<SchedulerError> for InfraError {
    fn from(err: SchedulerError) -> Self {
        let inner = match err {
            SchedulerError::Aborted(inner) => inner,
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                ServerTideError::InvalidInput(err.to_string())
            }
            SchedulerError::TaskJoinFailed(_) => ServerTideError::Internal(err.to_string()),
        };
        InfraError(inner)
    }
}

impl From<SchedulerError> for ServerTideError {
    fn from(err: SchedulerError) -> Self {
        InfraError::from(err).into()
    }
}

/// Convenience type alias for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
