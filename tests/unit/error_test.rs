//! Tests for error types

use prometheus_bulkhead::core::{SchedulerError, TaskError};

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("levels must be greater than 0".to_string());
    assert_eq!(format!("{}", err), "invalid configuration: levels must be greater than 0");
}

#[test]
fn test_unknown_resource_profile_error() {
    let err = SchedulerError::UnknownResourceProfile("billing-db".to_string());
    assert_eq!(format!("{}", err), "unknown resource profile: billing-db");
}

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("ingest".to_string());
    assert_eq!(format!("{}", err), "queue full: ingest");
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", SchedulerError::Shutdown), "scheduler is shut down");
}

#[test]
fn test_task_errors() {
    assert_eq!(TaskError::Failed("boom".into()).to_string(), "task failed: boom");
    assert_eq!(TaskError::Throttled("429".into()).to_string(), "task throttled: 429");
    assert_eq!(TaskError::Failed("a".into()), TaskError::Failed("a".into()));
}
