//! Reaction to unknown plan names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What the limiter does when a requested plan is not registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPlanPolicy {
    /// Abort the call with an error. Catches typos before they silently
    /// disable a limit.
    #[default]
    FailFast,
    /// Log a warning and evaluate the remaining plans.
    SkipWithWarn,
    /// Skip unknown plans, but abort if none of the requested plans exist.
    RequireAtLeastOne,
}

impl fmt::Display for MissingPlanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MissingPlanPolicy::FailFast => "fail_fast",
            MissingPlanPolicy::SkipWithWarn => "skip_with_warn",
            MissingPlanPolicy::RequireAtLeastOne => "require_at_least_one",
        };
        f.write_str(name)
    }
}

impl FromStr for MissingPlanPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail_fast" => Ok(MissingPlanPolicy::FailFast),
            "skip_with_warn" => Ok(MissingPlanPolicy::SkipWithWarn),
            "require_at_least_one" => Ok(MissingPlanPolicy::RequireAtLeastOne),
            _ => Err(ConfigError::UnknownMissingPlanPolicy(s.to_string())),
        }
    }
}
