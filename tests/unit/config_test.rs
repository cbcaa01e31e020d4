//! Tests for configuration validation and loading

use prometheus_bulkhead::config::{PriorityLevelConfig, SchedulerConfig};
use prometheus_bulkhead::core::ThrottleAction;

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.levels, 3);
    assert_eq!(cfg.default_priority, 1);
    assert_eq!(cfg.throttle_action, ThrottleAction::Requeue);
    assert_eq!(cfg.cancel_grace_ms, 1_000);
    assert!(cfg.worker_threads > 0);
}

#[test]
fn test_zero_levels_rejected() {
    let cfg = SchedulerConfig {
        levels: 0,
        default_priority: 0,
        priorities: Vec::new(),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_default_priority_out_of_range() {
    let cfg = SchedulerConfig {
        default_priority: 3,
        ..SchedulerConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("default_priority"));
}

#[test]
fn test_priority_level_out_of_range() {
    let mut cfg = SchedulerConfig::default();
    cfg.priorities.push(PriorityLevelConfig {
        level: 7,
        bulkhead: 1,
        overage: 0,
    });
    assert!(cfg.validate().is_err());
}

#[test]
fn test_duplicate_priority_level() {
    let mut cfg = SchedulerConfig::default();
    cfg.priorities.push(PriorityLevelConfig {
        level: 1,
        bulkhead: 1,
        overage: 0,
    });
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("twice"));
}

#[test]
fn test_zero_intervals_rejected() {
    let cfg = SchedulerConfig {
        poll_interval_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = SchedulerConfig {
        process_timeout_ms: 0,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = SchedulerConfig {
        poll_batch_limit: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_threshold_and_policy_domains() {
    let cfg = SchedulerConfig {
        overage_utilization_threshold: 1.5,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let mut cfg = SchedulerConfig::default();
    cfg.rate_limit.decrease_factor = 0.0;
    assert!(cfg.validate().is_err());

    let mut cfg = SchedulerConfig::default();
    cfg.rate_limit.floor = 0.0;
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("rate_limit.floor"));

    let mut cfg = SchedulerConfig::default();
    cfg.circuit.min_samples = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = SchedulerConfig::default();
    cfg.circuit.max_cooldown_secs = 1;
    cfg.circuit.cooldown_secs = 5;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_empty_profile_id_rejected() {
    let cfg = SchedulerConfig {
        resource_profiles: vec!["db".into(), String::new()],
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_capacity_lookup() {
    let cfg = SchedulerConfig {
        levels: 4,
        ..SchedulerConfig::default()
    };
    assert_eq!(cfg.capacity(1), (8, 2));
    assert_eq!(cfg.capacity(3), (0, 0));
}

#[test]
fn test_from_json_str_applies_defaults() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "levels": 2,
            "default_priority": 0,
            "priorities": [
                { "level": 0, "bulkhead": 1 },
                { "level": 1, "bulkhead": 3, "overage": 1 }
            ],
            "throttle_action": "drop",
            "resource_profiles": ["billing-db"],
            "circuit": { "min_samples": 20, "window": 200 }
        }"#,
    )
    .expect("valid config");

    assert_eq!(cfg.levels, 2);
    assert_eq!(cfg.capacity(0), (1, 0));
    assert_eq!(cfg.capacity(1), (3, 1));
    assert_eq!(cfg.throttle_action, ThrottleAction::Drop);
    assert_eq!(cfg.poll_interval_ms, 100);
    assert_eq!(cfg.circuit.min_samples, 20);
    assert_eq!(cfg.circuit.cooldown_secs, 5);
    assert_eq!(cfg.retry.realtime_max_retries, 3);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str("{ not json").is_err());
    assert!(SchedulerConfig::from_json_str(r#"{ "levels": 0 }"#).is_err());
}

#[test]
fn test_from_file() {
    let path = std::env::temp_dir().join(format!("bulkhead-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "levels": 1, "default_priority": 0, "priorities": [] }"#)
        .expect("write config");
    let cfg = SchedulerConfig::from_file(&path).expect("load config");
    assert_eq!(cfg.levels, 1);
    std::fs::remove_file(&path).ok();

    let missing = SchedulerConfig::from_file(path.with_extension("missing"));
    assert!(missing.is_err());
}

#[test]
fn test_from_env_overrides() {
    std::env::set_var("BULKHEAD_POLL_INTERVAL_MS", "25");
    std::env::set_var("BULKHEAD_PROCESS_TIMEOUT_MS", "1500");
    let cfg = SchedulerConfig::from_env().expect("env config");
    assert_eq!(cfg.poll_interval_ms, 25);
    assert_eq!(cfg.process_timeout_ms, 1_500);

    std::env::set_var("BULKHEAD_POLL_INTERVAL_MS", "soon");
    assert!(SchedulerConfig::from_env().is_err());

    std::env::remove_var("BULKHEAD_POLL_INTERVAL_MS");
    std::env::remove_var("BULKHEAD_PROCESS_TIMEOUT_MS");
}

#[test]
fn test_config_serde_roundtrip() {
    let cfg = SchedulerConfig::default();
    let json = serde_json::to_string(&cfg).expect("serialize");
    let back = SchedulerConfig::from_json_str(&json).expect("parse");
    assert_eq!(cfg, back);
}
