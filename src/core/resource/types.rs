//! Value types shared by the resource tracking components.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a throttleable downstream resource such as a database or an
/// external service. Created at configuration time and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceProfile {
    id: String,
}

impl ResourceProfile {
    /// Create a profile with the given stable identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Stable key of the profile.
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for ResourceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

impl From<&str> for ResourceProfile {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Terminal outcome of one tracked request against a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRequestResult {
    /// The request completed normally.
    Success,
    /// The request did not complete within its allotted time.
    Timeout,
    /// The resource rejected the request and asked for back-off.
    Throttled,
    /// The request failed with an error.
    Exception,
    /// The caller gave up after exhausting its retries.
    RetryExceeded,
    /// The request was abandoned without an outcome.
    Cancelled,
}

impl ResourceRequestResult {
    /// Whether the outcome counts against the health of the resource.
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Throttled | Self::Exception | Self::RetryExceeded
        )
    }
}

/// Reason attached to a non-terminal retry signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRetryReason {
    /// The previous attempt timed out.
    Timeout,
    /// The resource throttled the previous attempt.
    Throttle,
    /// The previous attempt raised an error.
    Exception,
    /// Any other caller-defined reason.
    Other,
}
