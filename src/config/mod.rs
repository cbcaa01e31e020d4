//! Configuration models for the scheduler, resources and retries.

pub mod scheduler;

pub use scheduler::{
    CircuitBreakerConfig, PriorityLevelConfig, RateLimitConfig, RetryConfig, SchedulerConfig,
};
