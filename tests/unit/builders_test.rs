//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_bulkhead::builders::{build_task_manager, TaskManagerBuilder};
use prometheus_bulkhead::config::{PriorityLevelConfig, SchedulerConfig};
use prometheus_bulkhead::core::{
    ResourceTracker, SchedulerError, TaskContext, TaskError, TaskExecutor, UtilizationOveragePolicy,
};
use prometheus_bulkhead::runtime::TokioSpawner;

#[derive(Clone)]
struct NoopExecutor;

#[async_trait]
impl TaskExecutor<u32> for NoopExecutor {
    async fn execute(&self, _payload: u32, _ctx: TaskContext) -> Result<(), TaskError> {
        Ok(())
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig {
        levels: 3,
        default_priority: 1,
        priorities: vec![
            PriorityLevelConfig {
                level: 0,
                bulkhead: 2,
                overage: 0,
            },
            PriorityLevelConfig {
                level: 2,
                bulkhead: 1,
                overage: 1,
            },
        ],
        poll_interval_ms: 20,
        poll_batch_limit: Some(5),
        process_timeout_ms: 750,
        cancel_grace_ms: 40,
        resource_profiles: vec!["billing-db".into()],
        ..SchedulerConfig::default()
    }
}

#[test]
fn test_builder_limits() {
    let builder = TaskManagerBuilder::new(config());
    let limits = builder.limits();
    assert_eq!(limits.default_priority, 1);
    assert_eq!(limits.poll_interval, Duration::from_millis(20));
    assert_eq!(limits.poll_batch_limit, Some(5));
    assert_eq!(limits.process_timeout, Duration::from_millis(750));
    assert_eq!(limits.cancel_grace, Duration::from_millis(40));
    assert_eq!(builder.config().levels, 3);
}

#[test]
fn test_builder_priorities_fill_missing_levels() {
    let priorities = TaskManagerBuilder::new(config()).priorities();
    assert_eq!(priorities.len(), 3);
    assert_eq!(priorities[0].bulk_head(), 2);
    assert_eq!(priorities[1].bulk_head(), 0);
    assert_eq!(priorities[2].bulk_head(), 1);
    assert_eq!(priorities[2].overage(), 1);
    assert!(priorities.iter().enumerate().all(|(i, p)| p.level() == i));
}

#[test]
fn test_builder_tracker_knows_profiles() {
    let tracker = TaskManagerBuilder::new(config()).build_tracker();
    assert!(tracker.profile("billing-db").is_ok());
    assert!(matches!(
        tracker.profile("unknown"),
        Err(SchedulerError::UnknownResourceProfile(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builder_builds_manager() {
    let manager = TaskManagerBuilder::new(config())
        .overage_policy(Arc::new(UtilizationOveragePolicy { threshold: 0.5 }))
        .build::<u32, _, _>(NoopExecutor, TokioSpawner::current())
        .expect("manager");
    assert_eq!(manager.levels(), 3);
    assert_eq!(manager.priority(0).map(|p| p.bulk_head()), Some(2));
    assert!(manager.resource_tracker().profile("billing-db").is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_builder_shares_tracker() {
    let tracker = Arc::new(ResourceTracker::default().with_profiles(["shared"]));
    let manager = TaskManagerBuilder::new(config())
        .resource_tracker(Arc::clone(&tracker))
        .build::<u32, _, _>(NoopExecutor, TokioSpawner::current())
        .expect("manager");
    assert!(Arc::ptr_eq(manager.resource_tracker(), &tracker));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_build_rejects_invalid_config() {
    let cfg = SchedulerConfig {
        default_priority: 9,
        ..config()
    };
    let result = build_task_manager::<u32, _, _>(&cfg, NoopExecutor, TokioSpawner::current());
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}
