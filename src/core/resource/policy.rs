//! Rate-limit adjustment policies.
//!
//! A policy maps the current adjustment percentage and the outcome of a
//! finished request to the next percentage. The caller clamps the returned
//! value into `[0, 1]`, so a policy cannot break that bound.

use super::types::ResourceRequestResult;

/// Strategy that drives the rate-limit adjustment percentage of a resource.
pub trait RateLimitPolicy: Send + Sync {
    /// Next percentage after `result` was observed at `current`.
    fn adjust(&self, current: f64, result: ResourceRequestResult) -> f64;
}

/// Additive-increase / multiplicative-decrease policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRateLimitPolicy {
    /// Amount added on each success.
    pub increase_step: f64,
    /// Factor applied on each failure.
    pub decrease_factor: f64,
    /// Lowest value the policy will report.
    pub floor: f64,
}

impl Default for StepRateLimitPolicy {
    fn default() -> Self {
        Self {
            increase_step: 0.05,
            decrease_factor: 0.5,
            floor: 0.05,
        }
    }
}

impl RateLimitPolicy for StepRateLimitPolicy {
    fn adjust(&self, current: f64, result: ResourceRequestResult) -> f64 {
        let next = match result {
            ResourceRequestResult::Success => current + self.increase_step,
            ResourceRequestResult::Cancelled => current,
            _ => current * self.decrease_factor,
        };
        next.clamp(self.floor.clamp(0.0, 1.0), 1.0)
    }
}
