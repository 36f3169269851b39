//! Defines the custom error type for the `core` module.

use std::path::PathBuf;
use thiserror::Error;

use super::JobId;

/// The primary error type for the `core` module.
///
/// Only failures that stop an operation as a whole end up here. Problems with
/// a single file during a scan or a recovery batch are recorded as
/// [`SkippedFile`](super::SkippedFile) diagnostics instead.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Represents an I/O error, typically from file system operations.
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// Represents a path that was expected to be a directory but was not.
    #[error("Path is not a valid directory: {0}")]
    NotADirectory(PathBuf),

    /// The requested job id was never issued, or its record has been evicted.
    #[error("No job with id {0}")]
    JobNotFound(JobId),

    /// Represents an error that occurred when a Tokio task was joined.
    /// This is often due to a task panicking.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The job service was built outside of a Tokio runtime.
    #[error("No Tokio runtime available: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
