//! Scheduler error types.

use drydock_core::InstanceId;
use thiserror::Error;

pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Errors surfaced by due-evaluation and scheduled actions.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression: {0}")]
    Cron(String),

    #[error("instance {0} is not running")]
    NotRunning(InstanceId),

    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),

    #[error("backup failed: {0}")]
    Backup(String),

    #[error(transparent)]
    Store(#[from] drydock_store::StoreError),

    #[error(transparent)]
    Supervisor(#[from] drydock_supervisor::SupervisorError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
