//! Core scheduling abstractions and capacity accounting.

pub mod error;
pub mod executor;
pub mod priority;
pub mod queue;
pub mod resource;
pub mod retry;
pub mod scheduler;
pub mod task;

pub use error::{AppResult, SchedulerError, TaskError};
pub use executor::{TaskExecutor, WorkSource};
pub use priority::{
    OveragePolicy, PrioritySettingsStatistics, TaskManagerPrioritySettings, Utilization,
    UtilizationOveragePolicy,
};
pub use queue::{
    Prioritised, PriorityDrain, QueueTracker, QueueTrackerContainer,
    QueueTrackerContainerStatistics, QueueTrackerHolder, QueueTrackerStatistics,
};
pub use resource::{
    Admission, CircuitBreakerPolicy, CircuitEvent, CircuitState, DefaultCircuitBreakerPolicy,
    RateLimitPolicy, RateLimiterStatistics, ResourceConsumer, ResourceProfile,
    ResourceRateLimiter, ResourceRequestGuard, ResourceRequestResult, ResourceRequestTrack,
    ResourceRetryReason, ResourceStatistics, ResourceStatisticsSnapshot, ResourceStatus,
    ResourceTracker, ResourceTrackerStatistics, StepRateLimitPolicy,
};
pub use retry::{PriorityRetryPolicy, RetryPolicy};
pub use scheduler::{
    Spawn, TaskManager, TaskManagerLimits, TaskManagerPolicies, TaskManagerStatistics,
    ThrottleAction,
};
pub use task::{
    CancellationSignal, TaskContext, TaskHandle, TaskId, TaskMetadata, TaskOutcome, TaskPayload,
    TaskTracker,
};
