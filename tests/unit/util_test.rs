//! Tests for utility functions

use std::time::Duration;

use prometheus_bulkhead::util::{duration_to_ms, elapsed_since, now_ms, tick};

#[test]
fn test_tick_is_monotonic() {
    let first = tick();
    std::thread::sleep(Duration::from_millis(5));
    let second = tick();
    assert!(second >= first + 5);
    assert!(elapsed_since(first) >= 5);
}

#[test]
fn test_elapsed_since_future_tick_is_zero() {
    assert_eq!(elapsed_since(tick() + 60_000), 0);
}

#[test]
fn test_now_ms_is_wall_clock() {
    // 2020-01-01T00:00:00Z
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_duration_to_ms() {
    assert_eq!(duration_to_ms(Duration::from_millis(1_500)), 1_500);
    assert_eq!(duration_to_ms(Duration::MAX), u64::MAX);
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_bulkhead::util::init_tracing();
    prometheus_bulkhead::util::init_tracing();
    tracing::info!(target: "bulkhead::test", "tracing initialised");
}
