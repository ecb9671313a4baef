//! The rate limiting orchestrator.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Decision, Policy};
use crate::error::RateLimitError;
use crate::ports::{BucketStore, PlanRegistry, RateLimitEventListener, RateLimiter};
use crate::support::MissingPlanPolicy;

/// Default [`RateLimiter`]: resolves plans, delegates the atomic check to a
/// [`BucketStore`] and fails open when the store errors.
///
/// Holds no mutable state of its own, so one instance can serve any number
/// of concurrent callers.
pub struct DefaultRateLimiter {
    store: Arc<dyn BucketStore>,
    registry: Arc<dyn PlanRegistry>,
    listeners: Vec<Arc<dyn RateLimitEventListener>>,
    missing_plan_policy: MissingPlanPolicy,
}

impl DefaultRateLimiter {
    /// Limiter with no listeners and [`MissingPlanPolicy::FailFast`].
    pub fn new(store: Arc<dyn BucketStore>, registry: Arc<dyn PlanRegistry>) -> Self {
        Self {
            store,
            registry,
            listeners: Vec::new(),
            missing_plan_policy: MissingPlanPolicy::default(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn RateLimitEventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_missing_plan_policy(mut self, policy: MissingPlanPolicy) -> Self {
        self.missing_plan_policy = policy;
        self
    }

    pub fn missing_plan_policy(&self) -> MissingPlanPolicy {
        self.missing_plan_policy
    }

    /// Storage port, for read-only inspection of bucket state.
    pub fn store(&self) -> &Arc<dyn BucketStore> {
        &self.store
    }

    fn resolve_plans(&self, key: &str, plan_names: &[&str]) -> Result<Vec<Policy>, RateLimitError> {
        let mut resolved: Vec<Policy> = Vec::with_capacity(plan_names.len());

        for &name in plan_names {
            if resolved.iter().any(|p| p.name() == name) {
                continue;
            }

            match self.registry.get_plan(name) {
                Some(policy) => resolved.push(policy),
                None => self.handle_missing_plan(name, key)?,
            }
        }

        if resolved.is_empty()
            && !plan_names.is_empty()
            && self.missing_plan_policy == MissingPlanPolicy::RequireAtLeastOne
        {
            return Err(RateLimitError::NoPlansResolved {
                key: key.to_string(),
            });
        }

        Ok(resolved)
    }

    fn handle_missing_plan(&self, plan: &str, key: &str) -> Result<(), RateLimitError> {
        self.notify(|l| l.on_plan_missing(plan));

        match self.missing_plan_policy {
            MissingPlanPolicy::FailFast => Err(RateLimitError::PlanNotFound {
                plan: plan.to_string(),
                key: key.to_string(),
            }),
            MissingPlanPolicy::SkipWithWarn | MissingPlanPolicy::RequireAtLeastOne => {
                tracing::warn!(plan = %plan, key = %key, "Rate limit plan not found, skipping. Check configuration.");
                Ok(())
            }
        }
    }

    /// Invoke `event` on every listener. A panicking listener is logged and
    /// skipped; it never stops the others or reaches the caller.
    fn notify(&self, event: impl Fn(&dyn RateLimitEventListener)) {
        for listener in &self.listeners {
            if catch_unwind(AssertUnwindSafe(|| event(listener.as_ref()))).is_err() {
                tracing::warn!("Rate limit event listener panicked; ignoring");
            }
        }
    }
}

#[async_trait]
impl RateLimiter for DefaultRateLimiter {
    async fn allow(
        &self,
        key: &str,
        plan_names: &[&str],
        cost: u32,
    ) -> Result<Decision, RateLimitError> {
        if cost == 0 {
            return Err(RateLimitError::InvalidCost);
        }

        let policies = self.resolve_plans(key, plan_names)?;

        if policies.is_empty() {
            let decision = Decision::allow_unmetered();
            tracing::debug!(key = %key, "No plans to evaluate, allowing");
            self.notify(|l| l.on_allow(key, plan_names, &decision));
            return Ok(decision);
        }

        match self.store.try_acquire(key, &policies, cost).await {
            Ok(decision) => {
                if decision.allowed {
                    tracing::debug!(key = %key, remaining = decision.remaining, "Request allowed");
                    self.notify(|l| l.on_allow(key, plan_names, &decision));
                } else {
                    tracing::debug!(
                        key = %key,
                        wait_ms = decision.wait.as_millis() as u64,
                        reason = %decision.reason,
                        "Request rate limited"
                    );
                    self.notify(|l| l.on_deny(key, plan_names, &decision));
                }
                Ok(decision)
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Rate limiter storage failure, failing open");
                let reason = e.to_string();
                self.notify(|l| l.on_fail_open(key, &reason));
                Ok(Decision::fail_open(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::domain::{BucketState, evaluate_plans};
    use crate::ports::StorageError;
    use crate::support::InMemoryPlanRegistry;

    /// Store evaluating against a fixed clock, one global lock.
    #[derive(Default)]
    struct FakeStore {
        buckets: Mutex<std::collections::HashMap<(String, String), BucketState>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl BucketStore for FakeStore {
        async fn try_acquire(
            &self,
            key: &str,
            policies: &[Policy],
            cost: u32,
        ) -> Result<Decision, StorageError> {
            self.calls
                .lock()
                .unwrap()
                .push(policies.iter().map(|p| p.name().to_string()).collect());

            let mut buckets = self.buckets.lock().unwrap();
            let plans: Vec<_> = policies
                .iter()
                .map(|p| (p, buckets.get(&(key.to_string(), p.name().to_string())).copied()))
                .collect();
            let eval = evaluate_plans(&plans, 0, cost);
            for (policy, state) in policies.iter().zip(eval.commit) {
                buckets.insert((key.to_string(), policy.name().to_string()), state);
            }
            Ok(eval.decision)
        }

        async fn get_state(
            &self,
            key: &str,
            policy_name: &str,
        ) -> Result<Option<BucketState>, StorageError> {
            Ok(self
                .buckets
                .lock()
                .unwrap()
                .get(&(key.to_string(), policy_name.to_string()))
                .copied())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl BucketStore for FailingStore {
        async fn try_acquire(&self, _: &str, _: &[Policy], _: u32) -> Result<Decision, StorageError> {
            Err(StorageError::Connection("Redis down".to_string()))
        }

        async fn get_state(&self, _: &str, _: &str) -> Result<Option<BucketState>, StorageError> {
            Err(StorageError::Connection("Redis down".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    impl RecordingListener {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl RateLimitEventListener for RecordingListener {
        fn on_allow(&self, key: &str, plans: &[&str], _: &Decision) {
            self.events.lock().unwrap().push(format!("allow:{key}:{}", plans.join(",")));
        }

        fn on_deny(&self, key: &str, plans: &[&str], _: &Decision) {
            self.events.lock().unwrap().push(format!("deny:{key}:{}", plans.join(",")));
        }

        fn on_fail_open(&self, key: &str, reason: &str) {
            self.events.lock().unwrap().push(format!("fail_open:{key}:{reason}"));
        }

        fn on_plan_missing(&self, plan: &str) {
            self.events.lock().unwrap().push(format!("missing:{plan}"));
        }
    }

    struct PanickingListener;

    impl RateLimitEventListener for PanickingListener {
        fn on_allow(&self, _: &str, _: &[&str], _: &Decision) {
            panic!("listener bug");
        }
    }

    fn registry() -> Arc<InMemoryPlanRegistry> {
        Arc::new(InMemoryPlanRegistry::from_policies([
            Policy::new("gold", 10, 1.0).unwrap(),
            Policy::new("burst", 2, 1.0).unwrap(),
        ]))
    }

    fn limiter(policy: MissingPlanPolicy) -> (DefaultRateLimiter, Arc<FakeStore>, Arc<RecordingListener>) {
        let store = Arc::new(FakeStore::default());
        let listener = Arc::new(RecordingListener::default());
        let limiter = DefaultRateLimiter::new(store.clone(), registry())
            .with_listener(listener.clone())
            .with_missing_plan_policy(policy);
        (limiter, store, listener)
    }

    #[tokio::test]
    async fn test_allow_notifies_listener() {
        let (limiter, _, listener) = limiter(MissingPlanPolicy::FailFast);

        let decision = limiter.allow("user-1", &["gold"], 1).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9.0);
        assert_eq!(listener.events(), vec!["allow:user-1:gold"]);
    }

    #[tokio::test]
    async fn test_deny_notifies_listener() {
        let (limiter, _, listener) = limiter(MissingPlanPolicy::FailFast);

        limiter.allow("user-1", &["burst"], 2).await.unwrap();
        let decision = limiter.allow("user-1", &["burst"], 1).await.unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.wait, Duration::from_millis(1_000));
        assert_eq!(listener.events(), vec!["allow:user-1:burst", "deny:user-1:burst"]);
    }

    #[tokio::test]
    async fn test_fail_fast_on_missing_plan() {
        let (limiter, store, listener) = limiter(MissingPlanPolicy::FailFast);

        let err = limiter.allow("user-1", &["gold", "missing"], 1).await.unwrap_err();

        assert_eq!(
            err,
            RateLimitError::PlanNotFound {
                plan: "missing".to_string(),
                key: "user-1".to_string()
            }
        );
        assert_eq!(listener.events(), vec!["missing:missing"]);
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_with_warn_evaluates_remaining_plans() {
        let (limiter, store, listener) = limiter(MissingPlanPolicy::SkipWithWarn);

        let decision = limiter.allow("user-1", &["missing", "gold"], 1).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(*store.calls.lock().unwrap(), vec![vec!["gold".to_string()]]);
        assert_eq!(listener.events(), vec!["missing:missing", "allow:user-1:missing,gold"]);
    }

    #[tokio::test]
    async fn test_skip_with_warn_all_missing_allows_unmetered() {
        let (limiter, store, _) = limiter(MissingPlanPolicy::SkipWithWarn);

        let decision = limiter.allow("user-1", &["missing"], 1).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, -1.0);
        assert!(store.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_require_at_least_one_blocks_when_nothing_resolves() {
        let (limiter, _, _) = limiter(MissingPlanPolicy::RequireAtLeastOne);

        let err = limiter.allow("user-1", &["nope", "none"], 1).await.unwrap_err();
        assert_eq!(
            err,
            RateLimitError::NoPlansResolved {
                key: "user-1".to_string()
            }
        );

        let decision = limiter.allow("user-1", &["nope", "gold"], 1).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_empty_plan_list_allows() {
        for policy in [
            MissingPlanPolicy::FailFast,
            MissingPlanPolicy::SkipWithWarn,
            MissingPlanPolicy::RequireAtLeastOne,
        ] {
            let (limiter, _, _) = limiter(policy);
            let decision = limiter.allow("user-1", &[], 1).await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, -1.0);
        }
    }

    #[tokio::test]
    async fn test_storage_failure_fails_open() {
        let listener = Arc::new(RecordingListener::default());
        let limiter = DefaultRateLimiter::new(Arc::new(FailingStore), registry())
            .with_listener(listener.clone());

        let decision = limiter.allow("user-1", &["gold"], 1).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, -1.0);
        assert!(decision.reason.starts_with("FAIL_OPEN: "));
        assert!(decision.reason.contains("Redis down"));
        assert_eq!(listener.events().len(), 1);
        assert!(listener.events()[0].starts_with("fail_open:user-1:"));
        assert!(listener.events()[0].contains("Redis down"));
    }

    #[tokio::test]
    async fn test_missing_plan_error_is_not_failed_open() {
        let limiter = DefaultRateLimiter::new(Arc::new(FailingStore), registry());
        assert!(limiter.allow("user-1", &["missing"], 1).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_cost_rejected() {
        let (limiter, _, _) = limiter(MissingPlanPolicy::FailFast);
        assert_eq!(
            limiter.allow("user-1", &["gold"], 0).await,
            Err(RateLimitError::InvalidCost)
        );
    }

    #[tokio::test]
    async fn test_duplicate_plans_charged_once() {
        let (limiter, store, _) = limiter(MissingPlanPolicy::FailFast);

        let decision = limiter.allow("user-1", &["gold", "gold"], 1).await.unwrap();

        assert_eq!(decision.remaining, 9.0);
        assert_eq!(*store.calls.lock().unwrap(), vec![vec!["gold".to_string()]]);
    }

    #[tokio::test]
    async fn test_denied_plan_does_not_leak_tokens_from_other_plan() {
        let (limiter, store, _) = limiter(MissingPlanPolicy::FailFast);

        limiter.allow("user-1", &["burst"], 2).await.unwrap();
        let before = store.get_state("user-1", "gold").await.unwrap();
        assert!(before.is_none());

        let decision = limiter.allow("user-1", &["gold", "burst"], 1).await.unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.reason, "RATE_LIMITED: burst");
        assert!(store.get_state("user-1", "gold").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_panicking_listener_is_isolated() {
        let recorder = Arc::new(RecordingListener::default());
        let limiter = DefaultRateLimiter::new(Arc::new(FakeStore::default()), registry())
            .with_listener(Arc::new(PanickingListener))
            .with_listener(recorder.clone());

        let decision = limiter.allow("user-1", &["gold"], 1).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(recorder.events(), vec!["allow:user-1:gold"]);
    }
}
