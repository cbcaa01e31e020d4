//! Per-resource counters and in-flight request records.
//!
//! Counters are plain atomics shared by every consumer of the resource. The
//! rate-limit adjustment percentage is an `f64` stored as bits in an
//! `AtomicU64` and updated with a compare-exchange loop, so concurrent `End`
//! calls never lose an update. In-flight tracks sit behind a read-mostly map
//! (retry signals only take the read side).

use std::collections::HashMap;
use std::mem::discriminant;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::circuit::{CircuitBreakerPolicy, CircuitEvent, CircuitState, ResourceStatus};
use super::policy::RateLimitPolicy;
use super::types::{ResourceProfile, ResourceRequestResult, ResourceRetryReason};
use crate::util::clock;

/// Record of one in-flight request against a resource.
#[derive(Debug)]
pub struct ResourceRequestTrack {
    id: Uuid,
    profile_id: String,
    consumer_id: Uuid,
    group: String,
    request_id: String,
    start_tick: u64,
    retry_count: AtomicU32,
    retry_time_ms: AtomicU64,
}

impl ResourceRequestTrack {
    /// Correlation id returned from `Start`.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Resource profile the request runs against.
    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Consumer that started the request.
    pub const fn consumer_id(&self) -> Uuid {
        self.consumer_id
    }

    /// Caller-defined grouping (for example the channel name).
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Caller-defined request identifier.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Tick at which tracking started.
    pub const fn start_tick(&self) -> u64 {
        self.start_tick
    }

    /// Retries recorded against this request.
    pub fn retry_count(&self) -> u32 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Accumulated retry time in milliseconds.
    pub fn retry_time_ms(&self) -> u64 {
        self.retry_time_ms.load(Ordering::Relaxed)
    }

    /// Milliseconds the request has been active.
    pub fn active_ms(&self) -> u64 {
        clock::elapsed_since(self.start_tick)
    }
}

/// Point-in-time view of a resource's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatisticsSnapshot {
    /// Resource profile id.
    pub profile_id: String,
    /// Requests currently active.
    pub active: i64,
    /// Requests started.
    pub started: u64,
    /// Requests ended successfully.
    pub succeeded: u64,
    /// Requests ended with a timeout.
    pub timed_out: u64,
    /// Requests ended throttled.
    pub throttled: u64,
    /// Requests ended with an exception or retry exhaustion.
    pub failed: u64,
    /// Requests ended cancelled.
    pub cancelled: u64,
    /// Retry signals recorded.
    pub retry_count: u64,
    /// Accumulated retry time in milliseconds.
    pub retry_time_ms: u64,
    /// Current adjustment percentage in `[0, 1]`.
    pub rate_limit_adjustment_percentage: f64,
    /// Current circuit status.
    pub status: ResourceStatus,
    /// Longest-running in-flight request in milliseconds.
    pub oldest_active_ms: Option<u64>,
}

/// Mutable counters for one resource profile.
pub struct ResourceStatistics {
    profile: ResourceProfile,
    active: AtomicI64,
    started: AtomicU64,
    succeeded: AtomicU64,
    timed_out: AtomicU64,
    throttled: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    retry_count: AtomicU64,
    retry_time_ms: AtomicU64,
    rate_limit_bits: AtomicU64,
    circuit: Mutex<CircuitState>,
    requests: RwLock<HashMap<Uuid, Arc<ResourceRequestTrack>>>,
    rate_policy: Arc<dyn RateLimitPolicy>,
    circuit_policy: Arc<dyn CircuitBreakerPolicy>,
}

impl std::fmt::Debug for ResourceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceStatistics")
            .field("profile", &self.profile)
            .field("active", &self.active())
            .field("rate_limit", &self.rate_limit_adjustment_percentage())
            .finish_non_exhaustive()
    }
}

impl ResourceStatistics {
    /// Create statistics for `profile` governed by the supplied policies.
    pub fn new(
        profile: ResourceProfile,
        rate_policy: Arc<dyn RateLimitPolicy>,
        circuit_policy: Arc<dyn CircuitBreakerPolicy>,
    ) -> Self {
        Self {
            profile,
            active: AtomicI64::new(0),
            started: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            retry_time_ms: AtomicU64::new(0),
            rate_limit_bits: AtomicU64::new(1.0_f64.to_bits()),
            circuit: Mutex::new(CircuitState::closed()),
            requests: RwLock::new(HashMap::new()),
            rate_policy,
            circuit_policy,
        }
    }

    /// Profile these statistics belong to.
    pub const fn profile(&self) -> &ResourceProfile {
        &self.profile
    }

    /// Requests currently active.
    pub fn active(&self) -> i64 {
        self.active.load(Ordering::Acquire)
    }

    /// Retry signals recorded.
    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Accumulated retry time in milliseconds.
    pub fn retry_time_ms(&self) -> u64 {
        self.retry_time_ms.load(Ordering::Relaxed)
    }

    /// Current adjustment percentage; lower means more throttling.
    pub fn rate_limit_adjustment_percentage(&self) -> f64 {
        f64::from_bits(self.rate_limit_bits.load(Ordering::Acquire))
    }

    /// Circuit status as of now.
    pub fn status(&self) -> ResourceStatus {
        self.status_at(Instant::now())
    }

    /// Circuit status at `now`.
    pub fn status_at(&self, now: Instant) -> ResourceStatus {
        self.circuit.lock().status(now)
    }

    /// Look up an in-flight request.
    pub fn request(&self, id: &Uuid) -> Option<Arc<ResourceRequestTrack>> {
        self.requests.read().get(id).cloned()
    }

    pub(crate) fn begin(&self, consumer_id: Uuid, group: &str, request_id: &str) -> Uuid {
        let track = Arc::new(ResourceRequestTrack {
            id: Uuid::new_v4(),
            profile_id: self.profile.id().to_owned(),
            consumer_id,
            group: group.to_owned(),
            request_id: request_id.to_owned(),
            start_tick: clock::tick(),
            retry_count: AtomicU32::new(0),
            retry_time_ms: AtomicU64::new(0),
        });
        let id = track.id;
        self.requests.write().insert(id, track);
        self.started.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::AcqRel);
        id
    }

    pub(crate) fn retry(
        &self,
        id: &Uuid,
        retry_start_tick: u64,
        reason: ResourceRetryReason,
    ) -> bool {
        let elapsed = clock::elapsed_since(retry_start_tick);
        let requests = self.requests.read();
        let Some(track) = requests.get(id) else {
            warn!(
                profile = %self.profile,
                request = %id,
                ?reason,
                "retry signalled for unknown request"
            );
            return false;
        };
        track.retry_count.fetch_add(1, Ordering::Relaxed);
        track.retry_time_ms.fetch_add(elapsed, Ordering::Relaxed);
        self.retry_count.fetch_add(1, Ordering::Relaxed);
        self.retry_time_ms.fetch_add(elapsed, Ordering::Relaxed);
        debug!(
            profile = %self.profile,
            request = %id,
            ?reason,
            elapsed_ms = elapsed,
            "resource retry"
        );
        true
    }

    pub(crate) fn end(&self, id: &Uuid, start_tick: u64, result: ResourceRequestResult) -> bool {
        if self.requests.write().remove(id).is_none() {
            warn!(
                profile = %self.profile,
                request = %id,
                ?result,
                "end signalled for unknown request"
            );
            return false;
        }
        self.active.fetch_sub(1, Ordering::AcqRel);

        let counter = match result {
            ResourceRequestResult::Success => &self.succeeded,
            ResourceRequestResult::Timeout => &self.timed_out,
            ResourceRequestResult::Throttled => &self.throttled,
            ResourceRequestResult::Exception | ResourceRequestResult::RetryExceeded => &self.failed,
            ResourceRequestResult::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.adjust_rate_limit(result);
        if result != ResourceRequestResult::Cancelled {
            self.advance_circuit(
                CircuitEvent::Outcome {
                    success: !result.is_failure(),
                },
                Instant::now(),
            );
        }
        debug!(
            profile = %self.profile,
            request = %id,
            ?result,
            duration_ms = clock::elapsed_since(start_tick),
            "resource request ended"
        );
        true
    }

    /// Re-evaluate time-driven circuit transitions at `now`.
    pub fn recalculate(&self, now: Instant) -> ResourceStatus {
        self.advance_circuit(CircuitEvent::Tick, now)
    }

    fn adjust_rate_limit(&self, result: ResourceRequestResult) {
        let _ = self
            .rate_limit_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                let current = f64::from_bits(bits);
                let next = self.rate_policy.adjust(current, result);
                let next = if next.is_nan() { current } else { next.clamp(0.0, 1.0) };
                Some(next.to_bits())
            });
    }

    fn advance_circuit(&self, event: CircuitEvent, now: Instant) -> ResourceStatus {
        let mut circuit = self.circuit.lock();
        let before = circuit.status(now);
        *circuit = self.circuit_policy.next(*circuit, event, now);
        let after = circuit.status(now);
        drop(circuit);

        if discriminant(&before) != discriminant(&after) {
            match after {
                ResourceStatus::Open { retry_in_seconds } => {
                    warn!(profile = %self.profile, retry_in_seconds, "resource circuit opened");
                }
                ResourceStatus::HalfOpen { filter_percentage } => {
                    info!(profile = %self.profile, filter_percentage, "resource circuit half-open");
                }
                ResourceStatus::Closed => info!(profile = %self.profile, "resource circuit closed"),
            }
        }
        after
    }

    /// Snapshot the counters for reporting.
    pub fn snapshot(&self) -> ResourceStatisticsSnapshot {
        let oldest_active_ms = self
            .requests
            .read()
            .values()
            .map(|track| track.active_ms())
            .max();
        ResourceStatisticsSnapshot {
            profile_id: self.profile.id().to_owned(),
            active: self.active(),
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            retry_count: self.retry_count(),
            retry_time_ms: self.retry_time_ms(),
            rate_limit_adjustment_percentage: self.rate_limit_adjustment_percentage(),
            status: self.status(),
            oldest_active_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{DefaultCircuitBreakerPolicy, StepRateLimitPolicy};

    fn stats() -> ResourceStatistics {
        ResourceStatistics::new(
            ResourceProfile::new("SqlDb"),
            Arc::new(StepRateLimitPolicy::default()),
            Arc::new(DefaultCircuitBreakerPolicy::default()),
        )
    }

    #[test]
    fn test_begin_end_balances_active() {
        let s = stats();
        let id = s.begin(Uuid::new_v4(), "g", "r1");
        assert_eq!(s.active(), 1);
        assert!(s.request(&id).is_some());
        assert!(s.end(&id, clock::tick(), ResourceRequestResult::Success));
        assert_eq!(s.active(), 0);
        assert!(s.request(&id).is_none());
    }

    #[test]
    fn test_double_end_is_ignored() {
        let s = stats();
        let id = s.begin(Uuid::new_v4(), "g", "r1");
        assert!(s.end(&id, clock::tick(), ResourceRequestResult::Success));
        assert!(!s.end(&id, clock::tick(), ResourceRequestResult::Success));
        assert_eq!(s.active(), 0);
    }

    #[test]
    fn test_retry_accumulates_without_ending() {
        let s = stats();
        let id = s.begin(Uuid::new_v4(), "g", "r1");
        assert!(s.retry(&id, clock::tick(), ResourceRetryReason::Throttle));
        assert!(s.retry(&id, clock::tick(), ResourceRetryReason::Exception));
        assert_eq!(s.active(), 1);
        assert_eq!(s.retry_count(), 2);
        assert_eq!(s.request(&id).map(|t| t.retry_count()), Some(2));
    }

    #[test]
    fn test_retry_for_unknown_request_leaves_counters() {
        let s = stats();
        let id = s.begin(Uuid::new_v4(), "g", "r1");
        assert!(s.end(&id, clock::tick(), ResourceRequestResult::Success));
        assert!(!s.retry(&id, 0, ResourceRetryReason::Timeout));
        assert!(!s.retry(&Uuid::new_v4(), 0, ResourceRetryReason::Exception));
        assert_eq!(s.retry_count(), 0);
        assert_eq!(s.retry_time_ms(), 0);
    }

    #[test]
    fn test_timeouts_lower_rate_limit() {
        let s = stats();
        let mut last = s.rate_limit_adjustment_percentage();
        assert!((last - 1.0).abs() < f64::EPSILON);
        for i in 0..5 {
            let id = s.begin(Uuid::new_v4(), "g", &i.to_string());
            s.end(&id, clock::tick(), ResourceRequestResult::Timeout);
            let now = s.rate_limit_adjustment_percentage();
            assert!(now < last);
            last = now;
        }
        let snap = s.snapshot();
        assert_eq!(snap.timed_out, 5);
        assert_eq!(snap.started, 5);
        assert_eq!(snap.active, 0);
    }
}
