//! Rate limit event observer port.

use crate::domain::Decision;

/// Observer notified about every rate limit outcome.
///
/// Listeners are for metrics and logging only; they cannot influence a
/// decision. All hooks default to no-ops. Hooks run synchronously on the
/// caller's task and should return quickly; a panicking listener is isolated
/// from the others and from the decision.
pub trait RateLimitEventListener: Send + Sync {
    /// The request passed every evaluated plan.
    fn on_allow(&self, _key: &str, _plans: &[&str], _decision: &Decision) {}

    /// The request was blocked by at least one plan.
    fn on_deny(&self, _key: &str, _plans: &[&str], _decision: &Decision) {}

    /// Storage failed and the request was let through.
    fn on_fail_open(&self, _key: &str, _reason: &str) {}

    /// A requested plan name is not registered.
    fn on_plan_missing(&self, _plan: &str) {}
}
