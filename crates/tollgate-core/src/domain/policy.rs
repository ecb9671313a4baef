//! Rate limit plans.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A named tier of service: bucket capacity plus a continuous refill rate.
///
/// Policies are validated on construction and immutable afterwards, so every
/// `Policy` reaching a storage backend is known to be well-formed. The name is
/// the policy's identity and doubles as a storage key segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPolicy", into = "RawPolicy")]
pub struct Policy {
    name: String,
    capacity: u64,
    refill_rate: f64,
}

/// Unvalidated wire form of a [`Policy`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPolicy {
    name: String,
    capacity: u64,
    refill_rate: f64,
}

impl Policy {
    /// Create a policy, rejecting zero capacity and non-positive or
    /// non-finite refill rates.
    pub fn new(
        name: impl Into<String>,
        capacity: u64,
        refill_rate: f64,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if name.contains(':') {
            return Err(ConfigError::InvalidName(name));
        }
        if capacity == 0 {
            return Err(ConfigError::InvalidCapacity { name });
        }
        if !refill_rate.is_finite() || refill_rate <= 0.0 {
            return Err(ConfigError::InvalidRefillRate {
                name,
                rate: refill_rate,
            });
        }

        Ok(Self {
            name,
            capacity,
            refill_rate,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of tokens the bucket can hold (burst size).
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens added per second.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// Time for an empty bucket to refill to capacity, `None` when it does
    /// not fit in a `Duration` (e.g. a huge capacity with a tiny rate).
    pub fn full_refill_time(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.capacity as f64 / self.refill_rate).ok()
    }
}

impl TryFrom<RawPolicy> for Policy {
    type Error = ConfigError;

    fn try_from(raw: RawPolicy) -> Result<Self, Self::Error> {
        Policy::new(raw.name, raw.capacity, raw.refill_rate)
    }
}

impl From<Policy> for RawPolicy {
    fn from(policy: Policy) -> Self {
        Self {
            name: policy.name,
            capacity: policy.capacity,
            refill_rate: policy.refill_rate,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.capacity, self.refill_rate)
    }
}

/// Parses the `name:capacity:rate` form, e.g. `gold:100:10.5`.
impl FromStr for Policy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ConfigError::Malformed(s.to_string());

        let mut parts = s.trim().split(':');
        let (Some(name), Some(capacity), Some(rate), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };

        let capacity = capacity.trim().parse().map_err(|_| malformed())?;
        let rate = rate.trim().parse().map_err(|_| malformed())?;

        Policy::new(name.trim(), capacity, rate)
    }
}
