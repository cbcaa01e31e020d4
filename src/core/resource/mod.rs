//! Resource tracking: per-resource statistics, consumers, rate limiters and
//! circuit breakers.

pub mod circuit;
pub mod consumer;
pub mod policy;
pub mod rate_limiter;
pub mod statistics;
pub mod tracker;
pub mod types;

pub use circuit::{
    CircuitBreakerPolicy, CircuitEvent, CircuitState, DefaultCircuitBreakerPolicy, ResourceStatus,
};
pub use consumer::{ResourceConsumer, ResourceRequestGuard};
pub use policy::{RateLimitPolicy, StepRateLimitPolicy};
pub use rate_limiter::{Admission, RateLimiterStatistics, ResourceRateLimiter};
pub use statistics::{ResourceRequestTrack, ResourceStatistics, ResourceStatisticsSnapshot};
pub use tracker::{ResourceTracker, ResourceTrackerStatistics};
pub use types::{ResourceProfile, ResourceRequestResult, ResourceRetryReason};
