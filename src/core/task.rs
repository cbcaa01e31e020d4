//! Units of work flowing through the task manager.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::core::queue::Prioritised;
use crate::core::resource::{ResourceConsumer, ResourceRateLimiter};
use crate::util::clock;

/// Task identifier.
pub type TaskId = Uuid;

/// Marker trait for task payloads. Payloads are cloned when work is retried.
pub trait TaskPayload: Send + Sync + Clone + 'static {}

/// Blanket implementation: any type meeting the requirements is a `TaskPayload`.
impl<T> TaskPayload for T where T: Send + Sync + Clone + 'static {}

/// Metadata describing a unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Stable correlation id.
    pub id: TaskId,
    /// Originating channel, used as the resource tracking group.
    pub channel: String,
    /// Priority supplied by the transport, if any.
    pub transport_priority: Option<usize>,
    /// Creation timestamp in milliseconds since epoch.
    pub created_at_ms: u128,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: "default".into(),
            transport_priority: None,
            created_at_ms: clock::now_ms(),
        }
    }
}

/// Terminal result delivered to the submitter of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum TaskOutcome {
    /// The work completed.
    Completed {
        /// Dispatch attempts used.
        attempts: u32,
    },
    /// The work failed and retries were exhausted.
    Failed {
        /// Last failure reason.
        reason: String,
        /// Dispatch attempts used.
        attempts: u32,
    },
    /// The work exceeded its time limit on the final attempt.
    TimedOut {
        /// Dispatch attempts used.
        attempts: u32,
    },
    /// The work was discarded without running to completion.
    Dropped {
        /// Why the work was discarded.
        reason: String,
    },
}

/// A pending unit of work plus the resource handles that govern it.
pub struct TaskTracker<P> {
    /// Metadata of the work.
    pub meta: TaskMetadata,
    /// Work payload handed to the executor.
    pub payload: P,
    pub(crate) priority: Option<usize>,
    pub(crate) attempt: u32,
    pub(crate) timeout: Option<Duration>,
    pub(crate) consumer: Option<Arc<ResourceConsumer>>,
    pub(crate) rate_limiter: Option<Arc<ResourceRateLimiter>>,
    pub(crate) completion: Option<oneshot::Sender<TaskOutcome>>,
}

impl<P> std::fmt::Debug for TaskTracker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTracker")
            .field("meta", &self.meta)
            .field("priority", &self.priority)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

impl<P> TaskTracker<P> {
    /// Wrap `payload` with fresh metadata.
    pub fn new(payload: P) -> Self {
        Self::with_meta(TaskMetadata::default(), payload)
    }

    /// Wrap `payload` with the supplied metadata.
    pub fn with_meta(meta: TaskMetadata, payload: P) -> Self {
        Self {
            meta,
            payload,
            priority: None,
            attempt: 0,
            timeout: None,
            consumer: None,
            rate_limiter: None,
            completion: None,
        }
    }

    /// Assign an explicit priority level.
    #[must_use]
    pub fn with_priority(mut self, priority: usize) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set the transport-supplied priority used when none is assigned.
    #[must_use]
    pub fn with_transport_priority(mut self, priority: usize) -> Self {
        self.meta.transport_priority = Some(priority);
        self
    }

    /// Set the originating channel.
    #[must_use]
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.meta.channel = channel.into();
        self
    }

    /// Override the task manager's processing timeout for this work.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Report requests of this work against `consumer`.
    #[must_use]
    pub fn with_consumer(mut self, consumer: Arc<ResourceConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Gate dispatch of this work on `limiter`.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<ResourceRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Task id.
    pub const fn id(&self) -> TaskId {
        self.meta.id
    }

    /// Dispatch attempts made so far.
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    pub(crate) fn complete(&mut self, outcome: TaskOutcome) {
        if let Some(tx) = self.completion.take() {
            let _ = tx.send(outcome);
        }
    }

    pub(crate) fn attach_completion(&mut self) -> TaskHandle {
        let (tx, rx) = oneshot::channel();
        self.completion = Some(tx);
        TaskHandle { id: self.meta.id, rx }
    }
}

impl<P> Prioritised for TaskTracker<P> {
    fn priority(&self) -> Option<usize> {
        self.priority
    }

    fn context_priority(&self) -> Option<usize> {
        self.meta.transport_priority
    }

    fn assign_priority(&mut self, level: usize) {
        self.priority = Some(level);
    }
}

/// Awaitable handle for a submitted task's outcome.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    /// Id of the submitted task.
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> TaskOutcome {
        self.rx.await.unwrap_or_else(|_| TaskOutcome::Dropped {
            reason: "task released without an outcome".into(),
        })
    }
}

/// Cancellation signal handed to executing work. Fired when the task
/// manager forcibly terminates the work after its time limit.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

impl CancellationSignal {
    pub(crate) fn pair() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Execution context passed to a [`TaskExecutor`](crate::core::TaskExecutor).
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Metadata of the work.
    pub meta: TaskMetadata,
    /// Level the work was dispatched from.
    pub priority: usize,
    /// 1-based dispatch attempt.
    pub attempt: u32,
    /// Fired on forced termination.
    pub cancel: CancellationSignal,
}
