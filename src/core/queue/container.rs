//! Priority router over one [`QueueTracker`] per level.

use serde::Serialize;
use tracing::trace;

use super::tracker::{QueueTracker, QueueTrackerStatistics};
use crate::core::SchedulerError;

/// Items that can be routed to a priority level.
pub trait Prioritised {
    /// Priority already assigned to the item, if any.
    fn priority(&self) -> Option<usize>;
    /// Priority carried by the item's originating context (for example a
    /// transport priority field), consulted when none is assigned.
    fn context_priority(&self) -> Option<usize> {
        None
    }
    /// Record the level the item was routed to.
    fn assign_priority(&mut self, level: usize);
}

/// Statistics for every level of a container.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueTrackerContainerStatistics {
    /// Items waiting across every level.
    pub waiting: usize,
    /// Per-level statistics, lowest level first.
    pub levels: Vec<QueueTrackerStatistics>,
}

/// Fixed set of priority queues, `0` lowest and `levels - 1` highest.
///
/// The level table is built once and never restructured, so only the queue
/// contents are shared mutable state.
#[derive(Debug)]
pub struct QueueTrackerContainer<T> {
    levels: Box<[QueueTracker<T>]>,
    default_priority: usize,
}

impl<T: Prioritised> QueueTrackerContainer<T> {
    /// Create a container with `levels` queues.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] when `levels` is zero.
    pub fn new(levels: usize, default_priority: usize) -> Result<Self, SchedulerError> {
        if levels == 0 {
            return Err(SchedulerError::InvalidConfig(
                "queue container needs at least one priority level".into(),
            ));
        }
        Ok(Self {
            levels: (0..levels).map(QueueTracker::new).collect(),
            default_priority: default_priority.min(levels - 1),
        })
    }

    /// Number of priority levels.
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    /// Clamp `priority` into the valid level range.
    pub fn clamp(&self, priority: usize) -> usize {
        priority.min(self.levels.len() - 1)
    }

    /// Queue for one level.
    pub fn level(&self, level: usize) -> Option<&QueueTracker<T>> {
        self.levels.get(level)
    }

    /// Resolve the item's level and route it there. Returns the level used.
    pub fn enqueue(&self, mut item: T) -> usize {
        let resolved = item
            .priority()
            .or_else(|| item.context_priority())
            .unwrap_or(self.default_priority);
        let level = self.clamp(resolved);
        item.assign_priority(level);
        self.levels[level].enqueue(item);
        trace!(level, "item enqueued");
        level
    }

    /// Return a previously dequeued item to the head of its level.
    pub fn requeue(&self, item: T) {
        let level = self.clamp(item.priority().unwrap_or(self.default_priority));
        self.levels[level].requeue(item);
    }

    /// Lazily take up to `max_count` items, highest level first and FIFO
    /// within a level. A lower level is only visited once every higher level
    /// is empty.
    pub fn dequeue(&self, max_count: usize) -> PriorityDrain<'_, T> {
        PriorityDrain {
            levels: &self.levels,
            current: Some(self.levels.len() - 1),
            remaining: max_count,
        }
    }

    /// Lazily take up to `max_count` items from one level only.
    pub fn dequeue_level(&self, level: usize, max_count: usize) -> PriorityDrain<'_, T> {
        let level = self.clamp(level);
        PriorityDrain {
            levels: &self.levels[level..=level],
            current: Some(0),
            remaining: max_count,
        }
    }

    /// True only when every level is empty.
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(QueueTracker::is_empty)
    }

    /// Items waiting across every level.
    pub fn len(&self) -> usize {
        self.levels.iter().map(QueueTracker::len).sum()
    }

    /// Snapshot every level.
    pub fn statistics(&self) -> QueueTrackerContainerStatistics {
        let levels: Vec<_> = self.levels.iter().map(QueueTracker::statistics).collect();
        QueueTrackerContainerStatistics {
            waiting: levels.iter().map(|l| l.waiting).sum(),
            levels,
        }
    }
}

/// Finite, lazy sequence produced by [`QueueTrackerContainer::dequeue`].
/// Items are only removed from the queues as the iterator is advanced.
#[derive(Debug)]
pub struct PriorityDrain<'a, T> {
    levels: &'a [QueueTracker<T>],
    current: Option<usize>,
    remaining: usize,
}

impl<T> Iterator for PriorityDrain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        while self.remaining > 0 {
            let level = self.current?;
            if let Some(item) = self.levels[level].try_dequeue() {
                self.remaining -= 1;
                return Some(item);
            }
            self.current = level.checked_sub(1);
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
