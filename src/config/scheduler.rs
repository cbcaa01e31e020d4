//! Scheduler, resource and retry configuration structures.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::{AppResult, ThrottleAction};

/// Capacity of one priority level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityLevelConfig {
    /// Level, `0..levels`.
    pub level: usize,
    /// Concurrent tasks reserved for the level.
    pub bulkhead: usize,
    /// Burst allowance above the bulkhead.
    #[serde(default)]
    pub overage: usize,
}

/// Rate-limit adjustment policy values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Amount added per success.
    pub increase_step: f64,
    /// Factor applied per failure, in `(0, 1]`.
    pub decrease_factor: f64,
    /// Lowest reported percentage, in `[0, 1]`.
    pub floor: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            increase_step: 0.05,
            decrease_factor: 0.5,
            floor: 0.05,
        }
    }
}

/// Circuit-breaker policy values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Minimum outcomes before the failure ratio is evaluated.
    pub min_samples: u32,
    /// Window after which counters decay.
    pub window: u32,
    /// Failure ratio that opens the circuit.
    pub failure_ratio: f64,
    /// Initial open cooldown in seconds.
    pub cooldown_secs: u64,
    /// Maximum cooldown in seconds.
    pub max_cooldown_secs: u64,
    /// Cooldown multiplier after a failed probe.
    pub backoff_multiplier: f64,
    /// Filter percentage when probing starts.
    pub half_open_filter: u8,
    /// Filter increase per successful probe.
    pub filter_step: u8,
    /// Probe successes required to close.
    pub successes_to_close: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            min_samples: 10,
            window: 100,
            failure_ratio: 0.5,
            cooldown_secs: 5,
            max_cooldown_secs: 60,
            backoff_multiplier: 2.0,
            half_open_filter: 10,
            filter_step: 10,
            successes_to_close: 5,
        }
    }
}

/// Retry policy values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries allowed at priority 0.
    pub background_max_retries: u32,
    /// Fixed delay between background retries in milliseconds.
    pub background_delay_ms: u64,
    /// Retries allowed above priority 0.
    pub realtime_max_retries: u32,
    /// First real-time retry delay in milliseconds.
    pub realtime_base_delay_ms: u64,
    /// Cap on the real-time retry delay in milliseconds.
    pub realtime_max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            background_max_retries: 1_000,
            background_delay_ms: 500,
            realtime_max_retries: 3,
            realtime_base_delay_ms: 100,
            realtime_max_delay_ms: 5_000,
        }
    }
}

fn default_worker_threads() -> usize {
    num_cpus::get()
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of priority levels.
    pub levels: usize,
    /// Level used for work without a priority.
    pub default_priority: usize,
    /// Per-level capacity; levels not listed get a bulkhead of zero.
    pub priorities: Vec<PriorityLevelConfig>,
    /// Maximum wait between poll cycles in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum tasks dispatched per poll cycle.
    pub poll_batch_limit: Option<usize>,
    /// Time after which running work is signalled to cancel, in milliseconds.
    pub process_timeout_ms: u64,
    /// Time between the cancel signal and the forced kill, in milliseconds.
    pub cancel_grace_ms: u64,
    /// Utilization below which levels may use their overage.
    pub overage_utilization_threshold: f64,
    /// Handling of rate-limited work.
    pub throttle_action: ThrottleAction,
    /// Resource profile ids known at startup.
    pub resource_profiles: Vec<String>,
    /// Rate-limit policy values.
    pub rate_limit: RateLimitConfig,
    /// Circuit-breaker policy values.
    pub circuit: CircuitBreakerConfig,
    /// Retry policy values.
    pub retry: RetryConfig,
    /// Runtime worker threads.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            levels: 3,
            default_priority: 1,
            priorities: vec![
                PriorityLevelConfig {
                    level: 0,
                    bulkhead: 2,
                    overage: 0,
                },
                PriorityLevelConfig {
                    level: 1,
                    bulkhead: 8,
                    overage: 2,
                },
                PriorityLevelConfig {
                    level: 2,
                    bulkhead: 4,
                    overage: 2,
                },
            ],
            poll_interval_ms: 100,
            poll_batch_limit: None,
            process_timeout_ms: 30_000,
            cancel_grace_ms: 1_000,
            overage_utilization_threshold: 0.75,
            throttle_action: ThrottleAction::Requeue,
            resource_profiles: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            circuit: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            worker_threads: default_worker_threads(),
        }
    }
}

fn unit_interval(name: &str, value: f64) -> Result<(), String> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be within [0, 1], got {value}"))
    }
}

impl RateLimitConfig {
    /// Validate rate-limit values.
    pub fn validate(&self) -> Result<(), String> {
        unit_interval("rate_limit.increase_step", self.increase_step)?;
        unit_interval("rate_limit.floor", self.floor)?;
        if self.floor <= 0.0 {
            return Err("rate_limit.floor must be greater than 0".into());
        }
        if self.decrease_factor <= 0.0 || self.decrease_factor > 1.0 {
            return Err("rate_limit.decrease_factor must be within (0, 1]".into());
        }
        Ok(())
    }
}

impl CircuitBreakerConfig {
    /// Validate circuit-breaker values.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_samples == 0 {
            return Err("circuit.min_samples must be greater than 0".into());
        }
        if self.window < self.min_samples {
            return Err("circuit.window must be at least circuit.min_samples".into());
        }
        unit_interval("circuit.failure_ratio", self.failure_ratio)?;
        if self.cooldown_secs == 0 || self.max_cooldown_secs < self.cooldown_secs {
            return Err(
                "circuit cooldowns must satisfy 0 < cooldown_secs <= max_cooldown_secs".into(),
            );
        }
        if self.backoff_multiplier < 1.0 {
            return Err("circuit.backoff_multiplier must be at least 1".into());
        }
        if self.half_open_filter == 0 || self.half_open_filter > 100 || self.filter_step > 100 {
            return Err("circuit filter percentages must be within 1..=100".into());
        }
        if self.successes_to_close == 0 {
            return Err("circuit.successes_to_close must be greater than 0".into());
        }
        Ok(())
    }
}

impl SchedulerConfig {
    /// Validate every section and fail on the first problem.
    pub fn validate(&self) -> Result<(), String> {
        if self.levels == 0 {
            return Err("levels must be greater than 0".into());
        }
        if self.default_priority >= self.levels {
            return Err(format!(
                "default_priority {} is outside 0..{}",
                self.default_priority, self.levels
            ));
        }
        let mut seen = vec![false; self.levels];
        for p in &self.priorities {
            let slot = seen.get_mut(p.level).ok_or_else(|| {
                format!("priority level {} is outside 0..{}", p.level, self.levels)
            })?;
            if *slot {
                return Err(format!("priority level {} configured twice", p.level));
            }
            *slot = true;
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.poll_batch_limit == Some(0) {
            return Err("poll_batch_limit must be greater than 0 when set".into());
        }
        if self.process_timeout_ms == 0 {
            return Err("process_timeout_ms must be greater than 0".into());
        }
        unit_interval("overage_utilization_threshold", self.overage_utilization_threshold)?;
        if self.resource_profiles.iter().any(String::is_empty) {
            return Err("resource profile ids must not be empty".into());
        }
        if self.worker_threads == 0 {
            return Err("worker_threads must be greater than 0".into());
        }
        self.rate_limit.validate()?;
        self.circuit.validate()?;
        Ok(())
    }

    /// Bulkhead and overage for `level`; zero when not configured.
    pub fn capacity(&self, level: usize) -> (usize, usize) {
        self.priorities
            .iter()
            .find(|p| p.level == level)
            .map_or((0, 0), |p| (p.bulkhead, p.overage))
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&raw)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("loading scheduler config {}", path.display()))
    }

    /// Load configuration from the environment, reading a `.env` file first
    /// when present.
    ///
    /// `BULKHEAD_CONFIG_JSON` supplies the whole document (defaults are used
    /// otherwise); `BULKHEAD_POLL_INTERVAL_MS` and
    /// `BULKHEAD_PROCESS_TIMEOUT_MS` override single values.
    ///
    /// # Errors
    ///
    /// Fails when a variable cannot be parsed or the result is invalid.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var("BULKHEAD_CONFIG_JSON") {
            Ok(json) => serde_json::from_str(&json).context("parsing BULKHEAD_CONFIG_JSON")?,
            Err(_) => Self::default(),
        };
        if let Ok(raw) = std::env::var("BULKHEAD_POLL_INTERVAL_MS") {
            cfg.poll_interval_ms = raw.parse().context("parsing BULKHEAD_POLL_INTERVAL_MS")?;
        }
        if let Ok(raw) = std::env::var("BULKHEAD_PROCESS_TIMEOUT_MS") {
            cfg.process_timeout_ms = raw.parse().context("parsing BULKHEAD_PROCESS_TIMEOUT_MS")?;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }
}
