//! The public admission decision.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reason attached to every allowed decision.
pub const REASON_OK: &str = "OK";
/// Prefix of the reason attached to denied decisions.
pub const REASON_RATE_LIMITED: &str = "RATE_LIMITED";
/// Prefix of the reason attached to decisions made without consulting storage.
pub const REASON_FAIL_OPEN: &str = "FAIL_OPEN";

/// Sentinel for "remaining budget unknown".
pub const UNKNOWN_REMAINING: f64 = -1.0;

/// Outcome of a rate limit check, possibly aggregated across several plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    /// Smallest token count left across the evaluated plans; `-1` if unknown.
    pub remaining: f64,
    /// How long to wait before retrying. Zero when allowed.
    pub wait: Duration,
    pub reason: String,
}

impl Decision {
    pub fn allow(remaining: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            wait: Duration::ZERO,
            reason: REASON_OK.to_string(),
        }
    }

    /// Allowed without any plan evaluated.
    pub fn allow_unmetered() -> Self {
        Self::allow(UNKNOWN_REMAINING)
    }

    /// Denied by `plan`, which needs `wait` before it can admit the request.
    pub fn deny(remaining: f64, wait: Duration, plan: &str) -> Self {
        Self {
            allowed: false,
            remaining,
            wait,
            reason: format!("{REASON_RATE_LIMITED}: {plan}"),
        }
    }

    /// Allowed because the limiter could not evaluate the request.
    pub fn fail_open(cause: impl std::fmt::Display) -> Self {
        Self {
            allowed: true,
            remaining: UNKNOWN_REMAINING,
            wait: Duration::ZERO,
            reason: format!("{REASON_FAIL_OPEN}: {cause}"),
        }
    }

    pub fn is_fail_open(&self) -> bool {
        self.reason.starts_with(REASON_FAIL_OPEN)
    }

    pub fn remaining_known(&self) -> bool {
        self.remaining >= 0.0
    }

    /// Wait rounded up to whole seconds, as used by `Retry-After`.
    pub fn retry_after_secs(&self) -> u64 {
        let millis = self.wait.as_millis() as u64;
        millis.div_ceil(1000)
    }
}
