//! Circuit-breaker automaton for resource health.
//!
//! The automaton is a plain value ([`CircuitState`]) advanced by a pure
//! transition function ([`CircuitBreakerPolicy::next`]) so every transition
//! can be driven deterministically with an explicit `now`. Admission logic
//! reads the derived [`ResourceStatus`] instead of the internal state.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Internal state of a resource circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation, with outcome counters for the current window.
    Closed {
        /// Successes observed in the current window.
        successes: u32,
        /// Failures observed in the current window.
        failures: u32,
    },
    /// Rejecting requests until `until`.
    Open {
        /// Instant at which probing may begin.
        until: Instant,
        /// Cooldown that produced `until`; grows on repeated trips.
        cooldown: Duration,
    },
    /// Probing: only `filter_percentage` of requests are let through.
    HalfOpen {
        /// Share of requests admitted, 0..=100.
        filter_percentage: u8,
        /// Consecutive probe successes.
        successes: u32,
        /// Cooldown carried forward if the probe fails.
        cooldown: Duration,
    },
}

impl CircuitState {
    /// A closed circuit with empty counters.
    pub const fn closed() -> Self {
        Self::Closed {
            successes: 0,
            failures: 0,
        }
    }

    /// Public view of the state at `now`.
    pub fn status(&self, now: Instant) -> ResourceStatus {
        match *self {
            Self::Closed { .. } => ResourceStatus::Closed,
            Self::Open { until, .. } => {
                let remaining = until.saturating_duration_since(now).as_secs_f64();
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let retry_in_seconds = remaining.ceil() as u64;
                ResourceStatus::Open { retry_in_seconds }
            }
            Self::HalfOpen {
                filter_percentage, ..
            } => ResourceStatus::HalfOpen { filter_percentage },
        }
    }
}

impl Default for CircuitState {
    fn default() -> Self {
        Self::closed()
    }
}

/// Input to the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitEvent {
    /// A request finished; `success` is false for timeouts and failures.
    Outcome {
        /// Whether the request succeeded.
        success: bool,
    },
    /// Periodic clock signal used to expire cooldowns.
    Tick,
}

/// Circuit status exposed to admission logic and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ResourceStatus {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected.
    Open {
        /// Seconds until probing begins.
        retry_in_seconds: u64,
    },
    /// A share of requests is admitted to probe recovery.
    HalfOpen {
        /// Share of requests admitted, 0..=100.
        filter_percentage: u8,
    },
}

impl ResourceStatus {
    /// Share of requests this status lets through, 0..=100.
    pub const fn filter_percentage(&self) -> u8 {
        match self {
            Self::Closed => 100,
            Self::Open { .. } => 0,
            Self::HalfOpen { filter_percentage } => *filter_percentage,
        }
    }
}

/// Pluggable transition function for resource circuits.
pub trait CircuitBreakerPolicy: Send + Sync {
    /// Compute the state following `event` observed at `now`.
    fn next(&self, state: CircuitState, event: CircuitEvent, now: Instant) -> CircuitState;
}

/// Failure-ratio circuit breaker with exponential cooldown back-off.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultCircuitBreakerPolicy {
    /// Minimum outcomes in a window before the ratio is evaluated.
    pub min_samples: u32,
    /// Window size; counters are halved once it is reached.
    pub window: u32,
    /// Failure ratio at or above which the circuit opens.
    pub failure_ratio: f64,
    /// Cooldown applied on the first trip.
    pub cooldown: Duration,
    /// Upper bound for backed-off cooldowns.
    pub max_cooldown: Duration,
    /// Cooldown multiplier applied when a probe fails.
    pub backoff_multiplier: f64,
    /// Filter percentage when probing starts.
    pub half_open_filter: u8,
    /// Filter increase per successful probe.
    pub filter_step: u8,
    /// Consecutive probe successes required to close.
    pub successes_to_close: u32,
}

impl Default for DefaultCircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            min_samples: 10,
            window: 100,
            failure_ratio: 0.5,
            cooldown: Duration::from_secs(5),
            max_cooldown: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            half_open_filter: 10,
            filter_step: 10,
            successes_to_close: 5,
        }
    }
}

impl DefaultCircuitBreakerPolicy {
    fn backed_off(&self, cooldown: Duration) -> Duration {
        Duration::try_from_secs_f64(cooldown.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(self.max_cooldown)
            .min(self.max_cooldown)
    }

    fn on_closed(
        &self,
        successes: u32,
        failures: u32,
        success: bool,
        now: Instant,
    ) -> CircuitState {
        let (mut successes, mut failures) = if success {
            (successes.saturating_add(1), failures)
        } else {
            (successes, failures.saturating_add(1))
        };
        let total = successes.saturating_add(failures);
        if total >= self.min_samples
            && f64::from(failures) / f64::from(total.max(1)) >= self.failure_ratio
        {
            return CircuitState::Open {
                until: now + self.cooldown,
                cooldown: self.cooldown,
            };
        }
        if total >= self.window {
            successes /= 2;
            failures /= 2;
        }
        CircuitState::Closed {
            successes,
            failures,
        }
    }
}

impl CircuitBreakerPolicy for DefaultCircuitBreakerPolicy {
    fn next(&self, state: CircuitState, event: CircuitEvent, now: Instant) -> CircuitState {
        match (state, event) {
            (CircuitState::Closed { .. }, CircuitEvent::Tick) => state,
            (
                CircuitState::Closed {
                    successes,
                    failures,
                },
                CircuitEvent::Outcome { success },
            ) => self.on_closed(successes, failures, success, now),
            (CircuitState::Open { until, cooldown }, _) => {
                if now >= until {
                    CircuitState::HalfOpen {
                        filter_percentage: self.half_open_filter.min(100),
                        successes: 0,
                        cooldown,
                    }
                } else {
                    state
                }
            }
            (CircuitState::HalfOpen { .. }, CircuitEvent::Tick) => state,
            (
                CircuitState::HalfOpen {
                    filter_percentage,
                    successes,
                    cooldown,
                },
                CircuitEvent::Outcome { success: true },
            ) => {
                let successes = successes.saturating_add(1);
                if successes >= self.successes_to_close {
                    CircuitState::closed()
                } else {
                    CircuitState::HalfOpen {
                        filter_percentage: filter_percentage
                            .saturating_add(self.filter_step)
                            .min(100),
                        successes,
                        cooldown,
                    }
                }
            }
            (CircuitState::HalfOpen { cooldown, .. }, CircuitEvent::Outcome { success: false }) => {
                let cooldown = self.backed_off(cooldown);
                CircuitState::Open {
                    until: now + cooldown,
                    cooldown,
                }
            }
        }
    }
}
