//! Single-priority FIFO with wait-time statistics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::util::clock;

/// A pending item stamped with its ingress tick.
#[derive(Debug)]
pub struct QueueTrackerHolder<T> {
    /// Tick at which the item entered the queue.
    pub ingress: u64,
    /// The queued item.
    pub item: T,
}

/// Point-in-time statistics for one queue level.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueTrackerStatistics {
    /// Priority level of the queue.
    pub level: usize,
    /// Items currently waiting.
    pub waiting: usize,
    /// Items enqueued since creation.
    pub enqueued: u64,
    /// Items dequeued since creation.
    pub dequeued: u64,
    /// Items pushed back to the head after a refused dispatch.
    pub requeued: u64,
    /// Mean wait of dequeued items in milliseconds.
    pub average_wait_ms: u64,
    /// Longest observed wait in milliseconds.
    pub max_wait_ms: u64,
}

/// Unbounded FIFO for one priority level.
///
/// Operations never block for longer than a short critical section on the
/// level's own lock; other levels are unaffected. `len` and `is_empty` are
/// advisory under concurrent use.
#[derive(Debug)]
pub struct QueueTracker<T> {
    level: usize,
    queue: Mutex<VecDeque<QueueTrackerHolder<T>>>,
    waiting: AtomicUsize,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    requeued: AtomicU64,
    wait_total_ms: AtomicU64,
    wait_max_ms: AtomicU64,
}

impl<T> QueueTracker<T> {
    /// Create an empty queue for `level`.
    pub fn new(level: usize) -> Self {
        Self {
            level,
            queue: Mutex::new(VecDeque::new()),
            waiting: AtomicUsize::new(0),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            wait_total_ms: AtomicU64::new(0),
            wait_max_ms: AtomicU64::new(0),
        }
    }

    /// Priority level served by this queue.
    pub const fn level(&self) -> usize {
        self.level
    }

    /// Append an item at the tail.
    pub fn enqueue(&self, item: T) {
        let holder = QueueTrackerHolder {
            ingress: clock::tick(),
            item,
        };
        let mut queue = self.queue.lock();
        queue.push_back(holder);
        self.waiting.store(queue.len(), Ordering::Release);
        drop(queue);
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Return an item to the head so it is served before later arrivals.
    pub fn requeue(&self, item: T) {
        let holder = QueueTrackerHolder {
            ingress: clock::tick(),
            item,
        };
        let mut queue = self.queue.lock();
        queue.push_front(holder);
        self.waiting.store(queue.len(), Ordering::Release);
        drop(queue);
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop the oldest item, recording how long it waited.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut queue = self.queue.lock();
        let holder = queue.pop_front()?;
        self.waiting.store(queue.len(), Ordering::Release);
        drop(queue);
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        let waited = clock::elapsed_since(holder.ingress);
        self.wait_total_ms.fetch_add(waited, Ordering::Relaxed);
        self.wait_max_ms.fetch_max(waited, Ordering::Relaxed);
        Some(holder.item)
    }

    /// Items currently waiting.
    pub fn len(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Whether no item is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the queue statistics.
    pub fn statistics(&self) -> QueueTrackerStatistics {
        let dequeued = self.dequeued.load(Ordering::Relaxed);
        let total = self.wait_total_ms.load(Ordering::Relaxed);
        QueueTrackerStatistics {
            level: self.level,
            waiting: self.len(),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued,
            requeued: self.requeued.load(Ordering::Relaxed),
            average_wait_ms: total.checked_div(dequeued).unwrap_or(0),
            max_wait_ms: self.wait_max_ms.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let q = QueueTracker::new(0);
        q.enqueue("a");
        q.enqueue("b");
        q.enqueue("c");
        assert_eq!(q.len(), 3);
        assert_eq!(q.try_dequeue(), Some("a"));
        assert_eq!(q.try_dequeue(), Some("b"));
        assert_eq!(q.try_dequeue(), Some("c"));
        assert_eq!(q.try_dequeue(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_requeue_goes_to_head() {
        let q = QueueTracker::new(1);
        q.enqueue(1);
        q.enqueue(2);
        let first = q.try_dequeue().expect("item");
        q.requeue(first);
        assert_eq!(q.try_dequeue(), Some(1));
        assert_eq!(q.try_dequeue(), Some(2));
        assert_eq!(q.statistics().requeued, 1);
    }

    #[test]
    fn test_wait_statistics() {
        let q = QueueTracker::new(2);
        q.enqueue(());
        std::thread::sleep(std::time::Duration::from_millis(5));
        q.try_dequeue();
        let stats = q.statistics();
        assert_eq!(stats.level, 2);
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.dequeued, 1);
        assert_eq!(stats.waiting, 0);
        assert!(stats.max_wait_ms >= 4);
        assert_eq!(stats.average_wait_ms, stats.max_wait_ms);
    }
}
