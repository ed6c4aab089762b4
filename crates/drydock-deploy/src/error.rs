//! Error types for the deployment pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors surfaced by the deployment pipeline. Stage variants carry the
/// triggering cause verbatim; the queue worker turns them into terminal
/// status reports.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("package unpack failed: {0}")]
    Package(String),

    #[error("runtime acquisition failed: {0}")]
    Runtime(String),

    #[error("core acquisition failed: {0}")]
    Core(String),

    #[error("mod-loader installation failed: {0}")]
    Installer(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("hash mismatch for {path}: expected {expected}, got {actual}")]
    HashMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("invalid maven coordinate: {0}")]
    Coordinate(String),

    #[error("unparseable game version: {0}")]
    Version(String),

    #[error("instance {0} not found")]
    InstanceNotFound(u64),

    #[error(transparent)]
    Store(#[from] drydock_store::StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
