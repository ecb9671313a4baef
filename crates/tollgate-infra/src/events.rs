//! Event listeners: structured logging and in-process counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use tollgate_core::domain::Decision;
use tollgate_core::ports::RateLimitEventListener;

/// Logs every rate limit event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventListener;

impl RateLimitEventListener for TracingEventListener {
    fn on_allow(&self, key: &str, plans: &[&str], decision: &Decision) {
        tracing::debug!(key = %key, plans = ?plans, remaining = decision.remaining, "Rate limit passed");
    }

    fn on_deny(&self, key: &str, plans: &[&str], decision: &Decision) {
        tracing::info!(
            key = %key,
            plans = ?plans,
            wait_ms = decision.wait.as_millis() as u64,
            reason = %decision.reason,
            "Rate limit exceeded"
        );
    }

    fn on_fail_open(&self, key: &str, reason: &str) {
        tracing::warn!(key = %key, reason = %reason, "Rate limiter failed open");
    }

    fn on_plan_missing(&self, plan: &str) {
        tracing::warn!(plan = %plan, "Rate limit plan missing");
    }
}

/// Counts rate limit events. Cheap enough to leave on in production and
/// read from a health or metrics endpoint.
#[derive(Debug, Default)]
pub struct CountingEventListener {
    allowed: AtomicU64,
    denied: AtomicU64,
    failed_open: AtomicU64,
    plans_missing: AtomicU64,
}

/// Point-in-time copy of [`CountingEventListener`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub allowed: u64,
    pub denied: u64,
    pub failed_open: u64,
    pub plans_missing: u64,
}

impl CountingEventListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> EventCounts {
        EventCounts {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            failed_open: self.failed_open.load(Ordering::Relaxed),
            plans_missing: self.plans_missing.load(Ordering::Relaxed),
        }
    }
}

impl RateLimitEventListener for CountingEventListener {
    fn on_allow(&self, _key: &str, _plans: &[&str], _decision: &Decision) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_deny(&self, _key: &str, _plans: &[&str], _decision: &Decision) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    fn on_fail_open(&self, _key: &str, _reason: &str) {
        self.failed_open.fetch_add(1, Ordering::Relaxed);
    }

    fn on_plan_missing(&self, _plan: &str) {
        self.plans_missing.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tollgate_core::domain::Policy;
    use tollgate_core::ports::RateLimiter;
    use tollgate_core::support::{InMemoryPlanRegistry, MissingPlanPolicy};
    use tollgate_core::DefaultRateLimiter;

    use crate::rate_limit::InMemoryBucketStore;

    #[tokio::test]
    async fn test_counts_through_limiter() {
        let counters = Arc::new(CountingEventListener::new());
        let registry = Arc::new(InMemoryPlanRegistry::from_policies([
            Policy::new("burst", 1, 0.001).unwrap(),
        ]));
        let limiter = DefaultRateLimiter::new(Arc::new(InMemoryBucketStore::new()), registry)
            .with_listener(Arc::new(TracingEventListener))
            .with_listener(counters.clone())
            .with_missing_plan_policy(MissingPlanPolicy::SkipWithWarn);

        limiter.allow("k", &["burst"], 1).await.unwrap();
        limiter.allow("k", &["burst"], 1).await.unwrap();
        limiter.allow("k", &["unknown"], 1).await.unwrap();

        assert_eq!(
            counters.snapshot(),
            EventCounts {
                allowed: 2,
                denied: 1,
                failed_open: 0,
                plans_missing: 1,
            }
        );
    }
}
