//! Builders that turn a [`SchedulerConfig`] into a running task manager.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::core::{
    DefaultCircuitBreakerPolicy, OveragePolicy, PriorityRetryPolicy, ResourceTracker, RetryPolicy,
    SchedulerError, Spawn, StepRateLimitPolicy, TaskExecutor, TaskManager, TaskManagerLimits,
    TaskManagerPolicies, TaskManagerPrioritySettings, TaskPayload, UtilizationOveragePolicy,
};

/// Assembles a [`TaskManager`] and its [`ResourceTracker`] from configuration.
///
/// Policies default to the ones described by the configuration and may be
/// replaced before [`build`](Self::build).
pub struct TaskManagerBuilder {
    config: SchedulerConfig,
    overage: Option<Arc<dyn OveragePolicy>>,
    retry: Option<Arc<dyn RetryPolicy>>,
    tracker: Option<Arc<ResourceTracker>>,
}

impl TaskManagerBuilder {
    /// Start from a configuration document.
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            overage: None,
            retry: None,
            tracker: None,
        }
    }

    /// Replace the overage policy derived from `overage_utilization_threshold`.
    #[must_use]
    pub fn overage_policy(mut self, policy: Arc<dyn OveragePolicy>) -> Self {
        self.overage = Some(policy);
        self
    }

    /// Replace the retry policy derived from the `retry` section.
    #[must_use]
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy>) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Share an existing resource tracker instead of building one.
    #[must_use]
    pub fn resource_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Configuration the builder was created with.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Scheduler limits derived from the configuration.
    pub fn limits(&self) -> TaskManagerLimits {
        TaskManagerLimits {
            default_priority: self.config.default_priority,
            poll_interval: Duration::from_millis(self.config.poll_interval_ms),
            poll_batch_limit: self.config.poll_batch_limit,
            process_timeout: Duration::from_millis(self.config.process_timeout_ms),
            cancel_grace: Duration::from_millis(self.config.cancel_grace_ms),
            throttle_action: self.config.throttle_action,
        }
    }

    /// One settings block per level, in level order.
    pub fn priorities(&self) -> Vec<TaskManagerPrioritySettings> {
        (0..self.config.levels)
            .map(|level| {
                let (bulk_head, overage) = self.config.capacity(level);
                TaskManagerPrioritySettings::new(level, bulk_head, overage)
            })
            .collect()
    }

    /// Resource tracker with the configured policies and profiles.
    pub fn build_tracker(&self) -> ResourceTracker {
        let rate = &self.config.rate_limit;
        let circuit = &self.config.circuit;
        ResourceTracker::new(
            Arc::new(StepRateLimitPolicy {
                increase_step: rate.increase_step,
                decrease_factor: rate.decrease_factor,
                floor: rate.floor,
            }),
            Arc::new(DefaultCircuitBreakerPolicy {
                min_samples: circuit.min_samples,
                window: circuit.window,
                failure_ratio: circuit.failure_ratio,
                cooldown: Duration::from_secs(circuit.cooldown_secs),
                max_cooldown: Duration::from_secs(circuit.max_cooldown_secs),
                backoff_multiplier: circuit.backoff_multiplier,
                half_open_filter: circuit.half_open_filter,
                filter_step: circuit.filter_step,
                successes_to_close: circuit.successes_to_close,
            }),
        )
        .with_profiles(self.config.resource_profiles.iter().cloned())
    }

    fn policies(&self) -> TaskManagerPolicies {
        let retry = &self.config.retry;
        TaskManagerPolicies {
            overage: self.overage.clone().unwrap_or_else(|| {
                Arc::new(UtilizationOveragePolicy {
                    threshold: self.config.overage_utilization_threshold,
                })
            }),
            retry: self.retry.clone().unwrap_or_else(|| {
                Arc::new(PriorityRetryPolicy {
                    background_max_retries: retry.background_max_retries,
                    background_delay: Duration::from_millis(retry.background_delay_ms),
                    realtime_max_retries: retry.realtime_max_retries,
                    realtime_base_delay: Duration::from_millis(retry.realtime_base_delay_ms),
                    realtime_max_delay: Duration::from_millis(retry.realtime_max_delay_ms),
                })
            }),
        }
    }

    /// Validate the configuration and build the task manager.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] when validation fails.
    pub fn build<P, E, S>(
        self,
        executor: E,
        spawner: S,
    ) -> Result<TaskManager<P, E, S>, SchedulerError>
    where
        P: TaskPayload,
        E: TaskExecutor<P>,
        S: Spawn + Clone + Send + Sync + 'static,
    {
        self.config.validate().map_err(SchedulerError::InvalidConfig)?;
        let tracker = self
            .tracker
            .clone()
            .unwrap_or_else(|| Arc::new(self.build_tracker()));
        TaskManager::new(
            self.limits(),
            self.priorities(),
            tracker,
            self.policies(),
            executor,
            spawner,
        )
    }
}

/// Build a task manager straight from configuration.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] when validation fails.
pub fn build_task_manager<P, E, S>(
    cfg: &SchedulerConfig,
    executor: E,
    spawner: S,
) -> Result<TaskManager<P, E, S>, SchedulerError>
where
    P: TaskPayload,
    E: TaskExecutor<P>,
    S: Spawn + Clone + Send + Sync + 'static,
{
    TaskManagerBuilder::new(cfg.clone()).build(executor, spawner)
}
