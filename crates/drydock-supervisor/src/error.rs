//! Error types for the supervisor.

use thiserror::Error;

/// Result type alias for supervisor operations.
pub type SupervisorResult<T> = Result<T, SupervisorError>;

/// Errors surfaced by supervisor operations. All are precondition
/// failures; trouble after a start has been accepted lands in the
/// instance's console ring instead of a return value.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("instance {0} is already running")]
    AlreadyRunning(u64),

    #[error("instance {0} has a deployment in progress")]
    Deploying(u64),

    #[error("instance {0} not found")]
    InstanceNotFound(u64),

    #[error(transparent)]
    Store(#[from] drydock_store::StoreError),
}
