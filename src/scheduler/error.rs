//! Scheduler error types.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Trigger persistence failed.
    ///
    /// Recoverable: the failed call is logged and the same work is retried
    /// on the next discovery pass or execution tick.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
