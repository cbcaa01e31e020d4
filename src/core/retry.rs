//! Retry policies applied to failed dispatches.

use std::time::Duration;

/// Strategy for retrying failed work.
pub trait RetryPolicy: Send + Sync {
    /// Retries allowed for work at `priority`.
    fn max_retries(&self, priority: usize) -> u32;
    /// Delay before retry number `attempt` (1-based) of work at `priority`.
    fn delay(&self, priority: usize, attempt: u32) -> Duration;
}

/// Background work (priority 0) retries many times with a short fixed delay;
/// real-time work retries a few times with exponentially increasing delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityRetryPolicy {
    /// Retries allowed at priority 0.
    pub background_max_retries: u32,
    /// Fixed delay between background retries.
    pub background_delay: Duration,
    /// Retries allowed above priority 0.
    pub realtime_max_retries: u32,
    /// First real-time retry delay; doubles per attempt.
    pub realtime_base_delay: Duration,
    /// Cap on the real-time delay.
    pub realtime_max_delay: Duration,
}

impl Default for PriorityRetryPolicy {
    fn default() -> Self {
        Self {
            background_max_retries: 1_000,
            background_delay: Duration::from_millis(500),
            realtime_max_retries: 3,
            realtime_base_delay: Duration::from_millis(100),
            realtime_max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy for PriorityRetryPolicy {
    fn max_retries(&self, priority: usize) -> u32 {
        if priority == 0 {
            self.background_max_retries
        } else {
            self.realtime_max_retries
        }
    }

    fn delay(&self, priority: usize, attempt: u32) -> Duration {
        if priority == 0 {
            return self.background_delay;
        }
        let shift = attempt.saturating_sub(1).min(31);
        self.realtime_base_delay
            .saturating_mul(1_u32 << shift)
            .min(self.realtime_max_delay)
    }
}
