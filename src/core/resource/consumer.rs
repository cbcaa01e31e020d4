//! Named caller bindings to a resource's statistics.

use std::sync::Arc;

use uuid::Uuid;

use super::statistics::ResourceStatistics;
use super::types::{ResourceRequestResult, ResourceRetryReason};
use crate::util::clock;

/// Handle through which one logical caller reports requests against a
/// resource. Many consumers may share the same [`ResourceStatistics`].
#[derive(Debug)]
pub struct ResourceConsumer {
    resource_id: Uuid,
    name: String,
    statistics: Arc<ResourceStatistics>,
}

impl ResourceConsumer {
    pub(crate) fn new(name: impl Into<String>, statistics: Arc<ResourceStatistics>) -> Self {
        Self {
            resource_id: Uuid::new_v4(),
            name: name.into(),
            statistics,
        }
    }

    /// Unique id of this consumer.
    pub const fn resource_id(&self) -> Uuid {
        self.resource_id
    }

    /// Consumer name supplied at registration.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statistics of the bound resource.
    pub const fn statistics(&self) -> &Arc<ResourceStatistics> {
        &self.statistics
    }

    /// Begin tracking a request and return its tracking id.
    ///
    /// Every call must be paired with exactly one [`end`](Self::end).
    pub fn start(&self, group: &str, request_id: &str) -> Uuid {
        self.statistics.begin(self.resource_id, group, request_id)
    }

    /// Terminal call for a tracked request. Returns `false` if the id is not
    /// in flight (already ended or never started); counters are untouched then.
    pub fn end(&self, track_id: Uuid, start_tick: u64, result: ResourceRequestResult) -> bool {
        self.statistics.end(&track_id, start_tick, result)
    }

    /// Record a non-terminal retry signal.
    pub fn retry(
        &self,
        track_id: Uuid,
        retry_start_tick: u64,
        reason: ResourceRetryReason,
    ) -> bool {
        self.statistics.retry(&track_id, retry_start_tick, reason)
    }

    /// Record a retry signal caused by an exception.
    pub fn exception(&self, track_id: Uuid, retry_start_tick: u64) -> bool {
        self.retry(track_id, retry_start_tick, ResourceRetryReason::Exception)
    }

    /// Start a request whose terminal call is guaranteed by the returned guard.
    pub fn track(&self, group: &str, request_id: &str) -> ResourceRequestGuard {
        let start_tick = clock::tick();
        let id = self.start(group, request_id);
        ResourceRequestGuard {
            statistics: Arc::clone(&self.statistics),
            id,
            start_tick,
            finished: false,
        }
    }
}

/// Owns one in-flight request. Dropping the guard without calling
/// [`end`](Self::end) ends the request as [`ResourceRequestResult::Cancelled`].
#[derive(Debug)]
#[must_use = "dropping the guard ends the request as cancelled"]
pub struct ResourceRequestGuard {
    statistics: Arc<ResourceStatistics>,
    id: Uuid,
    start_tick: u64,
    finished: bool,
}

impl ResourceRequestGuard {
    /// Tracking id of the request.
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Tick at which the request started.
    pub const fn start_tick(&self) -> u64 {
        self.start_tick
    }

    /// Record a retry signal against the request.
    pub fn retry(&self, retry_start_tick: u64, reason: ResourceRetryReason) {
        self.statistics.retry(&self.id, retry_start_tick, reason);
    }

    /// Record an exception against the request.
    pub fn exception(&self, retry_start_tick: u64) {
        self.retry(retry_start_tick, ResourceRetryReason::Exception);
    }

    /// End the request with `result`.
    pub fn end(mut self, result: ResourceRequestResult) {
        self.finish(result);
    }

    fn finish(&mut self, result: ResourceRequestResult) {
        if !self.finished {
            self.finished = true;
            self.statistics.end(&self.id, self.start_tick, result);
        }
    }
}

impl Drop for ResourceRequestGuard {
    fn drop(&mut self) {
        self.finish(ResourceRequestResult::Cancelled);
    }
}
