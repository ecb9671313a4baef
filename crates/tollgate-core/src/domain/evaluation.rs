//! All-or-nothing evaluation of one key against several plans.
//!
//! Every storage backend has to produce exactly these results. The in-memory
//! store calls [`evaluate_plans`] directly under its per-key lock; the Redis
//! store runs the same steps inside a Lua script.

use std::time::Duration;

use super::bucket::BucketState;
use super::decision::Decision;
use super::policy::Policy;

/// Aggregated result of a multi-plan evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    /// States to persist, in plan order. Empty when the request was denied:
    /// a denial must leave every bucket untouched.
    pub commit: Vec<BucketState>,
}

/// Evaluate `cost` against each `(policy, stored state)` pair at `now_ms`.
///
/// Buckets with no stored state start full. The request is allowed only if
/// every plan allows it; on denial the wait is the longest wait among the
/// denying plans and nothing is committed.
pub fn evaluate_plans(
    plans: &[(&Policy, Option<BucketState>)],
    now_ms: i64,
    cost: u32,
) -> Evaluation {
    let mut remaining = f64::INFINITY;
    let mut wait = Duration::ZERO;
    let mut blocking_plan: Option<&str> = None;
    let mut commit = Vec::with_capacity(plans.len());

    for (policy, stored) in plans {
        let state = stored.unwrap_or_else(|| BucketState::full(policy, now_ms));
        let outcome = state.try_consume(now_ms, cost, policy);

        remaining = remaining.min(outcome.updated_state.tokens());

        if outcome.allowed {
            commit.push(outcome.updated_state);
        } else if blocking_plan.is_none() || outcome.wait > wait {
            wait = outcome.wait;
            blocking_plan = Some(policy.name());
        }
    }

    if plans.is_empty() {
        return Evaluation {
            decision: Decision::allow_unmetered(),
            commit,
        };
    }

    match blocking_plan {
        Some(plan) => Evaluation {
            decision: Decision::deny(remaining, wait, plan),
            commit: Vec::new(),
        },
        None => Evaluation {
            decision: Decision::allow(remaining),
            commit,
        },
    }
}
