//! Token bucket state and the refill/consume transition.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::Policy;

/// Snapshot of one bucket: a fractional token count and the epoch-millisecond
/// timestamp of its last refill.
///
/// Timestamps come from a single clock per deployment (the storage backend's
/// clock). Transitions never mutate a state; they return a new one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    tokens: f64,
    last_refill_ms: i64,
}

/// Result of evaluating one policy against one bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumptionOutcome {
    pub allowed: bool,
    /// State to persist on allow; the refilled but undeducted state on deny.
    pub updated_state: BucketState,
    pub wait: Duration,
}

impl BucketState {
    /// Negative token counts are clamped to zero.
    pub fn new(tokens: f64, last_refill_ms: i64) -> Self {
        Self {
            tokens: tokens.max(0.0),
            last_refill_ms,
        }
    }

    /// A bucket seen for the first time starts full.
    pub fn full(policy: &Policy, now_ms: i64) -> Self {
        Self::new(policy.capacity() as f64, now_ms)
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn last_refill_ms(&self) -> i64 {
        self.last_refill_ms
    }

    /// Add the tokens accrued since the last refill, capped at capacity.
    ///
    /// If `now_ms` is not after the last refill (no time passed, or the clock
    /// went backwards) the state is returned unchanged.
    pub fn refill(&self, now_ms: i64, policy: &Policy) -> Self {
        if now_ms <= self.last_refill_ms {
            return *self;
        }

        let elapsed_ms = (now_ms - self.last_refill_ms) as f64;
        let added = (elapsed_ms / 1000.0) * policy.refill_rate();
        let tokens = (self.tokens + added).min(policy.capacity() as f64);

        Self {
            tokens,
            last_refill_ms: now_ms,
        }
    }

    /// Refill, then try to take `cost` tokens.
    pub fn try_consume(&self, now_ms: i64, cost: u32, policy: &Policy) -> ConsumptionOutcome {
        let refilled = self.refill(now_ms, policy);
        let cost = f64::from(cost);

        if refilled.tokens >= cost {
            return ConsumptionOutcome {
                allowed: true,
                updated_state: Self {
                    tokens: refilled.tokens - cost,
                    last_refill_ms: refilled.last_refill_ms,
                },
                wait: Duration::ZERO,
            };
        }

        let needed = cost - refilled.tokens;
        let wait_ms = ((needed / policy.refill_rate()) * 1000.0).ceil() as u64;

        ConsumptionOutcome {
            allowed: false,
            updated_state: refilled,
            wait: Duration::from_millis(wait_ms),
        }
    }
}
