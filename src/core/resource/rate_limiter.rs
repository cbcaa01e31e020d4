//! Combined throttle signal over several resources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use super::circuit::ResourceStatus;
use super::statistics::ResourceStatistics;

/// Result of an admission check against a rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Work may proceed.
    Admitted,
    /// Work should be held back.
    Throttled {
        /// Suggested wait when a circuit is open.
        retry_after: Option<Duration>,
    },
}

impl Admission {
    /// Whether the check admitted the work.
    pub const fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// Point-in-time view of a rate limiter.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStatistics {
    /// Limiter id.
    pub id: Uuid,
    /// Limiter name.
    pub name: String,
    /// Profiles aggregated by the limiter.
    pub profiles: Vec<String>,
    /// Lowest adjustment percentage across the profiles.
    pub rate_limit_adjustment_percentage: f64,
    /// Lowest circuit filter percentage across the profiles.
    pub filter_percentage: u8,
    /// Admission checks that passed.
    pub admitted: u64,
    /// Admission checks that were throttled.
    pub throttled: u64,
}

/// Aggregates the statistics of several resources into one admission signal.
///
/// The combined signal is the weakest member: the lowest adjustment
/// percentage scaled by the lowest circuit filter. Any open circuit throttles
/// outright. Partial admission is sampled with a ticket counter so that, for
/// example, a 0.3 signal admits 30 of every 100 checks. A signal that rounds
/// below one percent still admits one check in every hundred.
#[derive(Debug)]
pub struct ResourceRateLimiter {
    id: Uuid,
    name: String,
    resources: Vec<Arc<ResourceStatistics>>,
    ticket: AtomicU64,
    admitted: AtomicU64,
    throttled: AtomicU64,
}

impl ResourceRateLimiter {
    pub(crate) fn new(name: impl Into<String>, resources: Vec<Arc<ResourceStatistics>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            resources,
            ticket: AtomicU64::new(0),
            admitted: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
        }
    }

    /// Limiter id.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Limiter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics of the aggregated resources.
    pub fn resources(&self) -> &[Arc<ResourceStatistics>] {
        &self.resources
    }

    /// Lowest adjustment percentage across the resources, 1.0 when healthy.
    pub fn rate_limit_adjustment_percentage(&self) -> f64 {
        self.resources
            .iter()
            .map(|r| r.rate_limit_adjustment_percentage())
            .fold(1.0, f64::min)
    }

    /// Lowest circuit filter percentage across the resources.
    pub fn filter_percentage(&self) -> u8 {
        self.filter_percentage_at(Instant::now())
    }

    fn filter_percentage_at(&self, now: Instant) -> u8 {
        self.resources
            .iter()
            .map(|r| r.status_at(now).filter_percentage())
            .min()
            .unwrap_or(100)
    }

    /// Combined throttle signal in `[0, 1]`; 1.0 means unthrottled.
    pub fn combined_percentage(&self) -> f64 {
        self.rate_limit_adjustment_percentage() * f64::from(self.filter_percentage()) / 100.0
    }

    /// Decide whether one more unit of work may be dispatched.
    pub fn try_admit(&self) -> Admission {
        let now = Instant::now();
        let mut open_for: Option<u64> = None;
        let mut filter = 100_u8;
        for resource in &self.resources {
            match resource.status_at(now) {
                ResourceStatus::Open { retry_in_seconds } => {
                    open_for = Some(open_for.map_or(retry_in_seconds, |s| s.max(retry_in_seconds)));
                }
                status => filter = filter.min(status.filter_percentage()),
            }
        }
        if let Some(seconds) = open_for {
            return self.throttle(Some(Duration::from_secs(seconds)));
        }

        let combined = self.rate_limit_adjustment_percentage() * f64::from(filter) / 100.0;
        // At least one check in every hundred passes, otherwise a throttled
        // resource never sees the successes it needs to recover.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let threshold = ((combined.clamp(0.0, 1.0) * 100.0).round() as u64).max(1);
        if threshold >= 100 {
            return self.admit();
        }
        let ticket = self.ticket.fetch_add(1, Ordering::Relaxed) % 100;
        if ticket < threshold {
            self.admit()
        } else {
            self.throttle(None)
        }
    }

    fn admit(&self) -> Admission {
        self.admitted.fetch_add(1, Ordering::Relaxed);
        Admission::Admitted
    }

    fn throttle(&self, retry_after: Option<Duration>) -> Admission {
        self.throttled.fetch_add(1, Ordering::Relaxed);
        Admission::Throttled { retry_after }
    }

    /// Snapshot the limiter for reporting.
    pub fn statistics(&self) -> RateLimiterStatistics {
        RateLimiterStatistics {
            id: self.id,
            name: self.name.clone(),
            profiles: self
                .resources
                .iter()
                .map(|r| r.profile().id().to_owned())
                .collect(),
            rate_limit_adjustment_percentage: self.rate_limit_adjustment_percentage(),
            filter_percentage: self.filter_percentage(),
            admitted: self.admitted.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resource::{
        DefaultCircuitBreakerPolicy, ResourceProfile, ResourceRequestResult, StepRateLimitPolicy,
    };
    use crate::util::clock;

    fn resource(id: &str, floor: f64) -> Arc<ResourceStatistics> {
        Arc::new(ResourceStatistics::new(
            ResourceProfile::new(id),
            Arc::new(StepRateLimitPolicy {
                floor,
                ..StepRateLimitPolicy::default()
            }),
            Arc::new(DefaultCircuitBreakerPolicy {
                min_samples: 1_000,
                window: 10_000,
                ..DefaultCircuitBreakerPolicy::default()
            }),
        ))
    }

    fn fail(r: &ResourceStatistics) {
        let id = r.begin(Uuid::new_v4(), "g", "r");
        r.end(&id, clock::tick(), ResourceRequestResult::Timeout);
    }

    #[test]
    fn test_healthy_limiter_always_admits() {
        let limiter = ResourceRateLimiter::new("l", vec![resource("a", 0.0), resource("b", 0.0)]);
        assert!((limiter.combined_percentage() - 1.0).abs() < f64::EPSILON);
        for _ in 0..50 {
            assert!(limiter.try_admit().is_admitted());
        }
    }

    #[test]
    fn test_sampling_matches_percentage() {
        let a = resource("a", 0.5);
        let limiter = ResourceRateLimiter::new("l", vec![a.clone()]);
        fail(&a);
        assert!((limiter.combined_percentage() - 0.5).abs() < 1e-9);
        let admitted = (0..100).filter(|_| limiter.try_admit().is_admitted()).count();
        assert_eq!(admitted, 50);
        let stats = limiter.statistics();
        assert_eq!(stats.admitted, 50);
        assert_eq!(stats.throttled, 50);
    }

    #[test]
    fn test_collapsed_signal_still_admits_probes() {
        let a = resource("a", 0.0);
        let limiter = ResourceRateLimiter::new("l", vec![a.clone()]);
        for _ in 0..8 {
            fail(&a);
        }
        assert!(limiter.combined_percentage() < 0.005);
        let admitted = (0..1_000).filter(|_| limiter.try_admit().is_admitted()).count();
        assert_eq!(admitted, 10);

        for _ in 0..20 {
            let id = a.begin(Uuid::new_v4(), "g", "ok");
            a.end(&id, clock::tick(), ResourceRequestResult::Success);
        }
        assert!(limiter.combined_percentage() > 0.5);
    }

    #[test]
    fn test_empty_limiter_is_unthrottled() {
        let limiter = ResourceRateLimiter::new("l", Vec::new());
        assert!(limiter.try_admit().is_admitted());
        assert_eq!(limiter.filter_percentage(), 100);
    }
}
