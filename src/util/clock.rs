//! Monotonic tick source shared by queue and resource statistics.
//!
//! Ticks are milliseconds elapsed since a process-wide epoch captured on first
//! use. They are only meaningful relative to one another within a process.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// Current monotonic tick in milliseconds.
pub fn tick() -> u64 {
    duration_to_ms(epoch().elapsed())
}

/// Milliseconds elapsed since `start` (a value previously returned by [`tick`]).
pub fn elapsed_since(start: u64) -> u64 {
    tick().saturating_sub(start)
}

/// Wall-clock milliseconds since the unix epoch.
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Saturating conversion of a duration to whole milliseconds.
pub fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
