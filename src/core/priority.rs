//! Per-priority bulkhead capacity and admission counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;
use tracing::debug;

/// Point-in-time view of one priority level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrioritySettingsStatistics {
    /// Priority level.
    pub level: usize,
    /// Slots reserved for the level.
    pub bulk_head: usize,
    /// Burst allowance above the bulkhead.
    pub overage: usize,
    /// Tasks currently running.
    pub active: usize,
    /// Slots provisionally claimed by a poll cycle.
    pub reserved: usize,
    /// Tasks forcibly terminated.
    pub killed: u64,
    /// `max(bulk_head - active, 0)`.
    pub available: usize,
}

/// Bulkhead settings and live counters for one priority level.
///
/// All counters are atomics; decrements saturate at zero and
/// [`increment`](Self::increment) refuses to go past `bulk_head + overage`.
#[derive(Debug)]
pub struct TaskManagerPrioritySettings {
    level: usize,
    bulk_head: AtomicUsize,
    overage: AtomicUsize,
    active: AtomicUsize,
    reserved: AtomicUsize,
    killed: AtomicU64,
}

fn saturating_sub(counter: &AtomicUsize, count: usize) -> usize {
    counter
        .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            Some(v.saturating_sub(count))
        })
        .map_or(0, |prev| prev.saturating_sub(count))
}

impl TaskManagerPrioritySettings {
    /// Create settings for `level` with the given capacity.
    pub fn new(level: usize, bulk_head: usize, overage: usize) -> Self {
        Self {
            level,
            bulk_head: AtomicUsize::new(bulk_head),
            overage: AtomicUsize::new(overage),
            active: AtomicUsize::new(0),
            reserved: AtomicUsize::new(0),
            killed: AtomicU64::new(0),
        }
    }

    /// Priority level these settings govern.
    pub const fn level(&self) -> usize {
        self.level
    }

    /// Reconfigure capacity. Running tasks are not affected.
    pub fn bulk_head_set(&self, slot_count: usize, overage: usize) {
        self.bulk_head.store(slot_count, Ordering::Release);
        self.overage.store(overage, Ordering::Release);
        debug!(level = self.level, slot_count, overage, "bulkhead set");
    }

    /// Slots reserved for the level.
    pub fn bulk_head(&self) -> usize {
        self.bulk_head.load(Ordering::Acquire)
    }

    /// Burst allowance above the bulkhead.
    pub fn overage(&self) -> usize {
        self.overage.load(Ordering::Acquire)
    }

    /// Tasks currently running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Slots provisionally claimed.
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Acquire)
    }

    /// Tasks forcibly terminated.
    pub fn killed(&self) -> u64 {
        self.killed.load(Ordering::Relaxed)
    }

    /// `max(bulk_head - active, 0)`. Does not account for reservations.
    pub fn available(&self) -> usize {
        self.bulk_head().saturating_sub(self.active())
    }

    /// Slots a poll cycle may still claim: the bulkhead (plus overage when
    /// `with_overage`) minus active and reserved.
    pub fn claimable(&self, with_overage: bool) -> usize {
        let ceiling = if with_overage {
            self.bulk_head().saturating_add(self.overage())
        } else {
            self.bulk_head()
        };
        ceiling
            .saturating_sub(self.active())
            .saturating_sub(self.reserved())
    }

    /// Provisionally claim `count` slots.
    pub fn reserve(&self, count: usize) {
        self.reserved.fetch_add(count, Ordering::AcqRel);
    }

    /// Return `count` provisionally claimed slots.
    pub fn release(&self, count: usize) {
        saturating_sub(&self.reserved, count);
    }

    /// Record a task start. Returns `false`, leaving the counter unchanged,
    /// when the level is already at `bulk_head + overage`.
    pub fn increment(&self) -> bool {
        let ceiling = self.bulk_head().saturating_add(self.overage());
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < ceiling).then_some(active + 1)
            })
            .is_ok()
    }

    /// Record a task finish; `force` marks a forcibly terminated task.
    pub fn decrement(&self, force: bool) {
        saturating_sub(&self.active, 1);
        if force {
            self.killed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot the counters.
    pub fn statistics(&self) -> PrioritySettingsStatistics {
        PrioritySettingsStatistics {
            level: self.level,
            bulk_head: self.bulk_head(),
            overage: self.overage(),
            active: self.active(),
            reserved: self.reserved(),
            killed: self.killed(),
            available: self.available(),
        }
    }

    /// One-line summary for logs.
    pub fn debug(&self) -> String {
        let s = self.statistics();
        format!(
            "Level={} BulkHead={} Overage={} Active={} Reserved={} Killed={} Available={}",
            s.level, s.bulk_head, s.overage, s.active, s.reserved, s.killed, s.available
        )
    }
}

/// System-wide utilization passed to an [`OveragePolicy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Utilization {
    /// Tasks running across every level.
    pub total_active: usize,
    /// Sum of every level's bulkhead.
    pub total_bulk_head: usize,
}

impl Utilization {
    /// Compute utilization over `levels`.
    pub fn of(levels: &[TaskManagerPrioritySettings]) -> Self {
        levels.iter().fold(Self::default(), |acc, l| Self {
            total_active: acc.total_active + l.active(),
            total_bulk_head: acc.total_bulk_head + l.bulk_head(),
        })
    }

    /// `total_active / total_bulk_head`, 0 when no capacity is configured.
    pub fn ratio(&self) -> f64 {
        if self.total_bulk_head == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.total_active as f64 / self.total_bulk_head as f64;
        ratio
    }
}

/// Decides when a level may dispatch into its overage allowance.
pub trait OveragePolicy: Send + Sync {
    /// Whether `level` may use its overage given system `utilization`.
    fn allow_overage(&self, level: &TaskManagerPrioritySettings, utilization: Utilization) -> bool;
}

/// Allows overage while system utilization is below `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtilizationOveragePolicy {
    /// Utilization ratio, in `[0, 1]`, below which overage is allowed.
    pub threshold: f64,
}

impl Default for UtilizationOveragePolicy {
    fn default() -> Self {
        Self { threshold: 0.75 }
    }
}

impl OveragePolicy for UtilizationOveragePolicy {
    fn allow_overage(&self, level: &TaskManagerPrioritySettings, utilization: Utilization) -> bool {
        level.overage() > 0 && utilization.ratio() < self.threshold
    }
}
