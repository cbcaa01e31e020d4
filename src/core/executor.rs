//! Dispatch target and work source abstractions.

use async_trait::async_trait;

use super::error::TaskError;
use super::task::{TaskContext, TaskPayload, TaskTracker};

/// Abstraction for executing a task payload.
///
/// The executor runs the business logic of one unit of work and reports
/// success or failure. It should observe [`TaskContext::cancel`] for long
/// running work: the signal fires when the time limit passes, and the future
/// is dropped once the cancel grace period has also elapsed.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_bulkhead::core::{TaskContext, TaskError, TaskExecutor};
///
/// #[derive(Clone)]
/// struct OrderExecutor;
///
/// #[async_trait]
/// impl TaskExecutor<String> for OrderExecutor {
///     async fn execute(&self, payload: String, _ctx: TaskContext) -> Result<(), TaskError> {
///         if payload.is_empty() {
///             return Err(TaskError::Failed("empty order".into()));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskExecutor<P>: Send + Sync + Clone + 'static
where
    P: TaskPayload,
{
    /// Execute `payload`.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] when the work failed or was throttled by a
    /// downstream resource; the task manager applies its retry policy.
    async fn execute(&self, payload: P, ctx: TaskContext) -> Result<(), TaskError>;
}

/// Pull-style source of inbound work (a listener or an in-memory bridge).
pub trait WorkSource<P>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;
    /// Take up to `max` pending items without blocking.
    fn try_pull(&self, max: usize) -> Vec<TaskTracker<P>>;
}
