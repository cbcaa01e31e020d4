//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration values were rejected at startup.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A resource profile name was not registered with the tracker.
    #[error("unknown resource profile: {0}")]
    UnknownResourceProfile(String),
    /// The target queue refused the item.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// The task manager has been stopped.
    #[error("scheduler is shut down")]
    Shutdown,
}

/// Failure reported by a dispatched unit of work.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The work failed; it may be retried according to the retry policy.
    #[error("task failed: {0}")]
    Failed(String),
    /// A downstream resource asked the caller to back off.
    #[error("task throttled: {0}")]
    Throttled(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
