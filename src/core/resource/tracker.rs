//! Registry of resource statistics, consumers and rate limiters.
//!
//! One tracker exists per running service. It is handed to the task manager
//! and to command code explicitly; there is no ambient global instance.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use super::circuit::{CircuitBreakerPolicy, DefaultCircuitBreakerPolicy};
use super::consumer::ResourceConsumer;
use super::policy::{RateLimitPolicy, StepRateLimitPolicy};
use super::rate_limiter::{RateLimiterStatistics, ResourceRateLimiter};
use super::statistics::{ResourceStatistics, ResourceStatisticsSnapshot};
use super::types::ResourceProfile;
use crate::core::SchedulerError;

/// Aggregate view of every resource and rate limiter.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceTrackerStatistics {
    /// Whether the tracker is started.
    pub running: bool,
    /// Consumers registered since creation.
    pub consumers_registered: u64,
    /// Per-resource snapshots ordered by profile id.
    pub resources: Vec<ResourceStatisticsSnapshot>,
    /// Per-limiter snapshots in registration order.
    pub rate_limiters: Vec<RateLimiterStatistics>,
}

/// Shared registry mapping profile ids to [`ResourceStatistics`].
pub struct ResourceTracker {
    resources: RwLock<HashMap<String, Arc<ResourceStatistics>>>,
    rate_limiters: RwLock<Vec<Arc<ResourceRateLimiter>>>,
    known_profiles: HashSet<String>,
    consumers_registered: AtomicU64,
    running: AtomicBool,
    rate_policy: Arc<dyn RateLimitPolicy>,
    circuit_policy: Arc<dyn CircuitBreakerPolicy>,
}

impl std::fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTracker")
            .field("resources", &self.resources.read().len())
            .field("rate_limiters", &self.rate_limiters.read().len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new(
            Arc::new(StepRateLimitPolicy::default()),
            Arc::new(DefaultCircuitBreakerPolicy::default()),
        )
    }
}

impl ResourceTracker {
    /// Create a tracker whose resources use the given policies.
    pub fn new(
        rate_policy: Arc<dyn RateLimitPolicy>,
        circuit_policy: Arc<dyn CircuitBreakerPolicy>,
    ) -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            rate_limiters: RwLock::new(Vec::new()),
            known_profiles: HashSet::new(),
            consumers_registered: AtomicU64::new(0),
            running: AtomicBool::new(false),
            rate_policy,
            circuit_policy,
        }
    }

    /// Declare the profile ids that [`profile`](Self::profile) resolves.
    #[must_use]
    pub fn with_profiles<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_profiles.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Resolve a declared profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownResourceProfile`] when the name was
    /// neither declared nor registered.
    pub fn profile(&self, id: &str) -> Result<ResourceProfile, SchedulerError> {
        if self.known_profiles.contains(id) || self.resources.read().contains_key(id) {
            Ok(ResourceProfile::new(id))
        } else {
            Err(SchedulerError::UnknownResourceProfile(id.to_owned()))
        }
    }

    fn statistics_for(&self, profile: &ResourceProfile) -> Arc<ResourceStatistics> {
        if let Some(existing) = self.resources.read().get(profile.id()) {
            return Arc::clone(existing);
        }
        let mut resources = self.resources.write();
        Arc::clone(resources.entry(profile.id().to_owned()).or_insert_with(|| {
            debug!(profile = %profile, "resource statistics created");
            Arc::new(ResourceStatistics::new(
                profile.clone(),
                Arc::clone(&self.rate_policy),
                Arc::clone(&self.circuit_policy),
            ))
        }))
    }

    /// Register a named consumer against `profile`. Returns `None` when no
    /// profile is supplied.
    pub fn register_consumer(
        &self,
        name: &str,
        profile: Option<&ResourceProfile>,
    ) -> Option<Arc<ResourceConsumer>> {
        let profile = profile?;
        let statistics = self.statistics_for(profile);
        self.consumers_registered.fetch_add(1, Ordering::Relaxed);
        let consumer = Arc::new(ResourceConsumer::new(name, statistics));
        debug!(
            consumer = name,
            profile = %profile,
            id = %consumer.resource_id(),
            "resource consumer registered"
        );
        Some(consumer)
    }

    /// Register a rate limiter over `profiles`. Returns `None` when the set is
    /// empty. Duplicate profiles are aggregated once.
    pub fn register_request_rate_limiter(
        &self,
        name: &str,
        profiles: &[ResourceProfile],
    ) -> Option<Arc<ResourceRateLimiter>> {
        if profiles.is_empty() {
            return None;
        }
        let mut seen = HashSet::new();
        let resources = profiles
            .iter()
            .filter(|p| seen.insert(p.id()))
            .map(|p| self.statistics_for(p))
            .collect();
        let limiter = Arc::new(ResourceRateLimiter::new(name, resources));
        self.rate_limiters.write().push(Arc::clone(&limiter));
        debug!(limiter = name, profiles = profiles.len(), "rate limiter registered");
        Some(limiter)
    }

    /// Statistics for a registered profile id.
    pub fn resource(&self, id: &str) -> Option<Arc<ResourceStatistics>> {
        self.resources.read().get(id).cloned()
    }

    /// Advance time-driven circuit transitions on every resource.
    pub fn recalculate(&self) {
        self.recalculate_at(Instant::now());
    }

    /// Advance time-driven circuit transitions as of `now`.
    pub fn recalculate_at(&self, now: Instant) {
        let resources: Vec<_> = self.resources.read().values().cloned().collect();
        for resource in resources {
            resource.recalculate(now);
        }
    }

    /// Mark the tracker as serving.
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::AcqRel) {
            info!(profiles = self.known_profiles.len(), "resource tracker started");
        }
    }

    /// Mark the tracker as stopped. Statistics remain readable.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            info!("resource tracker stopped");
        }
    }

    /// Whether the tracker is started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Recompute the aggregate statistics.
    pub fn statistics(&self) -> ResourceTrackerStatistics {
        let mut resources: Vec<_> = self
            .resources
            .read()
            .values()
            .map(|r| r.snapshot())
            .collect();
        resources.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));
        ResourceTrackerStatistics {
            running: self.is_running(),
            consumers_registered: self.consumers_registered.load(Ordering::Relaxed),
            resources,
            rate_limiters: self
                .rate_limiters
                .read()
                .iter()
                .map(|l| l.statistics())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_consumer_is_get_or_add() {
        let tracker = ResourceTracker::default();
        let profile = ResourceProfile::new("SqlDb");
        let a = tracker.register_consumer("a", Some(&profile)).expect("consumer");
        let b = tracker.register_consumer("b", Some(&profile)).expect("consumer");
        assert!(Arc::ptr_eq(a.statistics(), b.statistics()));
        assert_ne!(a.resource_id(), b.resource_id());
        assert_eq!(tracker.statistics().resources.len(), 1);
        assert_eq!(tracker.statistics().consumers_registered, 2);
    }

    #[test]
    fn test_null_inputs_are_noops() {
        let tracker = ResourceTracker::default();
        assert!(tracker.register_consumer("a", None).is_none());
        assert!(tracker.register_request_rate_limiter("l", &[]).is_none());
        assert!(tracker.statistics().resources.is_empty());
    }

    #[test]
    fn test_profile_resolution() {
        let tracker = ResourceTracker::default().with_profiles(["Entity"]);
        assert!(tracker.profile("Entity").is_ok());
        assert!(matches!(
            tracker.profile("Missing"),
            Err(SchedulerError::UnknownResourceProfile(name)) if name == "Missing"
        ));
    }

    #[test]
    fn test_limiter_dedupes_profiles() {
        let tracker = ResourceTracker::default();
        let p = ResourceProfile::new("Entity");
        let limiter = tracker
            .register_request_rate_limiter("l", &[p.clone(), p])
            .expect("limiter");
        assert_eq!(limiter.resources().len(), 1);
    }

    #[test]
    fn test_start_stop() {
        let tracker = ResourceTracker::default();
        assert!(!tracker.is_running());
        tracker.start();
        assert!(tracker.statistics().running);
        tracker.stop();
        assert!(!tracker.is_running());
    }
}
