//! Data Transfer Objects - request/response types for the limits API.

use serde::{Deserialize, Serialize};

/// Ask whether `key` may spend `cost` tokens against `plans`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub key: String,
    pub plans: Vec<String>,
    /// Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<u32>,
}

impl CheckRequest {
    pub fn cost(&self) -> u32 {
        self.cost.unwrap_or(1)
    }
}

/// Outcome of a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub allowed: bool,
    /// Smallest remaining balance across the checked plans, -1 when unknown.
    pub remaining: f64,
    pub retry_after_ms: u64,
    pub reason: String,
}

/// Stored state of one bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketStateResponse {
    pub key: String,
    pub plan: String,
    pub tokens: f64,
    pub last_refill_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_request_cost_defaults_to_one() {
        let req: CheckRequest =
            serde_json::from_str(r#"{"key":"user-1","plans":["gold","burst"]}"#).unwrap();
        assert_eq!(req.cost(), 1);
        assert_eq!(req.plans, vec!["gold", "burst"]);

        let req: CheckRequest =
            serde_json::from_str(r#"{"key":"user-1","plans":[],"cost":5}"#).unwrap();
        assert_eq!(req.cost(), 5);
    }
}
