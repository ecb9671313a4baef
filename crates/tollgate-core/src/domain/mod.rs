//! Domain model - pure token bucket logic with no I/O.

mod bucket;
mod decision;
mod evaluation;
mod policy;

pub use bucket::{BucketState, ConsumptionOutcome};
pub use decision::{
    Decision, REASON_FAIL_OPEN, REASON_OK, REASON_RATE_LIMITED, UNKNOWN_REMAINING,
};
pub use evaluation::{Evaluation, evaluate_plans};
pub use policy::Policy;
