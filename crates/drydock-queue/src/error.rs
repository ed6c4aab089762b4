//! Error types for the deployment queue.

use thiserror::Error;

/// Result type alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced at job submission. Both are immediate precondition
/// failures; nothing in the queue retries on the caller's behalf.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("deployment queue is full, try again")]
    Full,

    #[error("deployment queue is closed")]
    Closed,
}
