//! In-memory work source bridging producers to the task manager.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::trace;

use crate::core::{SchedulerError, TaskTracker, WorkSource};

/// Manual bridge: producers inject trackers, the task manager pulls them.
#[derive(Debug)]
pub struct InMemoryWorkSource<P> {
    name: String,
    tx: Sender<TaskTracker<P>>,
    rx: Receiver<TaskTracker<P>>,
}

impl<P> InMemoryWorkSource<P> {
    /// Create an empty, unbounded source.
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            name: name.into(),
            tx,
            rx,
        }
    }

    /// Create an empty source that holds at most `capacity` pending items.
    pub fn bounded(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            name: name.into(),
            tx,
            rx,
        }
    }

    /// Producer handle that can be cloned across threads.
    pub fn sender(&self) -> WorkSender<P> {
        WorkSender {
            tx: self.tx.clone(),
        }
    }

    /// Inject one tracker.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::QueueFull`] when a bounded source is full.
    pub fn inject(&self, task: TaskTracker<P>) -> Result<(), SchedulerError> {
        self.sender().inject(task)
    }

    /// Items waiting to be pulled.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<P: Send + Sync> WorkSource<P> for InMemoryWorkSource<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_pull(&self, max: usize) -> Vec<TaskTracker<P>> {
        let pulled: Vec<_> = self.rx.try_iter().take(max).collect();
        if !pulled.is_empty() {
            trace!(source = %self.name, count = pulled.len(), "pulled work");
        }
        pulled
    }
}

/// Cloneable producer side of an [`InMemoryWorkSource`].
#[derive(Debug)]
pub struct WorkSender<P> {
    tx: Sender<TaskTracker<P>>,
}

impl<P> Clone for WorkSender<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P> WorkSender<P> {
    /// Inject one tracker.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Shutdown`] once the source is dropped and
    /// [`SchedulerError::QueueFull`] when a bounded source is full.
    pub fn inject(&self, task: TaskTracker<P>) -> Result<(), SchedulerError> {
        self.tx.try_send(task).map_err(|e| match e {
            TrySendError::Disconnected(_) => SchedulerError::Shutdown,
            TrySendError::Full(_) => SchedulerError::QueueFull("work source is full".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_respects_max_and_order() {
        let source = InMemoryWorkSource::new("bridge");
        for i in 0..5_u32 {
            source.inject(TaskTracker::new(i)).expect("inject");
        }
        let first: Vec<_> = source.try_pull(3).into_iter().map(|t| t.payload).collect();
        assert_eq!(first, vec![0, 1, 2]);
        assert_eq!(source.len(), 2);
        assert_eq!(source.try_pull(10).len(), 2);
        assert!(source.is_empty());
    }

    #[test]
    fn test_bounded_source_rejects_when_full() {
        let source = InMemoryWorkSource::bounded("bridge", 2);
        source.inject(TaskTracker::new(1_u8)).expect("inject");
        source.sender().inject(TaskTracker::new(2)).expect("inject");
        assert!(matches!(
            source.inject(TaskTracker::new(3)),
            Err(SchedulerError::QueueFull(_))
        ));
        assert_eq!(source.try_pull(1).len(), 1);
        assert!(source.inject(TaskTracker::new(4)).is_ok());
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn test_sender_after_drop_reports_shutdown() {
        let source = InMemoryWorkSource::<u8>::new("bridge");
        let sender = source.sender();
        drop(source);
        assert!(matches!(
            sender.inject(TaskTracker::new(1)),
            Err(SchedulerError::Shutdown)
        ));
    }
}
