//! In-memory bucket store.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use tollgate_core::domain::{BucketState, Decision, Policy, evaluate_plans};
use tollgate_core::ports::{BucketStore, Clock, StorageError};

use crate::clock::SystemClock;

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Per-identity bucket states, keyed by plan name.
#[derive(Debug)]
struct KeyBuckets {
    plans: HashMap<String, BucketState>,
    /// Epoch ms from which every bucket of the key is full again.
    /// `i64::MAX` when some plan never refills within range.
    idle_at_ms: i64,
}

impl KeyBuckets {
    fn commit(&mut self, policies: &[Policy], states: Vec<BucketState>) {
        for (policy, state) in policies.iter().zip(states) {
            let full_at = idle_at(policy, state.last_refill_ms());
            self.idle_at_ms = self.idle_at_ms.max(full_at);
            self.plans.insert(policy.name().to_string(), state);
        }
    }
}

/// When a bucket written at `last_refill_ms` is full again, whatever it held.
fn idle_at(policy: &Policy, last_refill_ms: i64) -> i64 {
    policy
        .full_refill_time()
        .and_then(|d| i64::try_from(d.as_nanos().div_ceil(1_000_000)).ok())
        .and_then(|ms| last_refill_ms.checked_add(ms))
        .unwrap_or(i64::MAX)
}

/// Process-local bucket store.
///
/// All plans of one identity key live in a single map entry, and evaluation
/// happens while holding that entry's shard lock, so concurrent calls for the
/// same key are serialized and a denial never leaves a partial deduction.
/// Different keys on different shards proceed in parallel.
///
/// Keys whose buckets have all refilled completely are dropped by a periodic
/// sweep, since a fresh bucket would start full anyway.
///
/// Note: limits are per-process, not shared across instances, and state is
/// lost on restart. Use the Redis store for a fleet.
pub struct InMemoryBucketStore {
    buckets: DashMap<String, KeyBuckets>,
    clock: Arc<dyn Clock>,
    sweep_interval_ms: i64,
    last_sweep_ms: AtomicI64,
}

impl InMemoryBucketStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let now_ms = clock.now_millis();
        Self {
            buckets: DashMap::new(),
            clock,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL.as_millis() as i64,
            last_sweep_ms: AtomicI64::new(now_ms),
        }
    }

    /// Minimum store-clock time between two automatic sweeps.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
        self
    }

    /// Number of identity keys with stored state.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn clear(&self) {
        self.buckets.clear();
    }

    /// Drop every key whose buckets are all full again. Returns how many
    /// keys were removed.
    pub fn purge_idle(&self) -> usize {
        let now_ms = self.clock.now_millis();
        self.last_sweep_ms.store(now_ms, Ordering::Relaxed);
        self.sweep(now_ms)
    }

    fn sweep(&self, now_ms: i64) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, buckets| buckets.idle_at_ms > now_ms);
        let removed = before.saturating_sub(self.buckets.len());

        if removed > 0 {
            tracing::debug!(removed, remaining = self.buckets.len(), "Evicted idle rate limit keys");
        }
        removed
    }

    /// Sweep if the interval has elapsed. One caller wins the race; the rest
    /// carry on without sweeping.
    fn maybe_sweep(&self, now_ms: i64) {
        let last = self.last_sweep_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) < self.sweep_interval_ms {
            return;
        }
        if self
            .last_sweep_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.sweep(now_ms);
        }
    }

    fn evaluate(
        stored: Option<&KeyBuckets>,
        policies: &[Policy],
        now_ms: i64,
        cost: u32,
    ) -> (Decision, Vec<BucketState>) {
        let plans: Vec<(&Policy, Option<BucketState>)> = policies
            .iter()
            .map(|p| (p, stored.and_then(|b| b.plans.get(p.name()).copied())))
            .collect();

        let eval = evaluate_plans(&plans, now_ms, cost);
        (eval.decision, eval.commit)
    }
}

impl Default for InMemoryBucketStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BucketStore for InMemoryBucketStore {
    async fn try_acquire(
        &self,
        key: &str,
        policies: &[Policy],
        cost: u32,
    ) -> Result<Decision, StorageError> {
        let now_ms = self.clock.now_millis();

        // Must run before taking an entry guard: retain locks every shard.
        self.maybe_sweep(now_ms);

        // The entry guard is the per-key critical section.
        let decision = match self.buckets.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let (decision, states) = Self::evaluate(Some(entry.get()), policies, now_ms, cost);
                entry.get_mut().commit(policies, states);
                decision
            }
            Entry::Vacant(entry) => {
                let (decision, states) = Self::evaluate(None, policies, now_ms, cost);
                if !states.is_empty() {
                    let mut buckets = KeyBuckets {
                        plans: HashMap::with_capacity(policies.len()),
                        idle_at_ms: i64::MIN,
                    };
                    buckets.commit(policies, states);
                    entry.insert(buckets);
                }
                decision
            }
        };

        tracing::trace!(
            key = %key,
            allowed = decision.allowed,
            remaining = decision.remaining,
            "In-memory bucket evaluation"
        );

        Ok(decision)
    }

    async fn get_state(
        &self,
        key: &str,
        policy_name: &str,
    ) -> Result<Option<BucketState>, StorageError> {
        Ok(self
            .buckets
            .get(key)
            .and_then(|buckets| buckets.plans.get(policy_name).copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::clock::ManualClock;

    fn store() -> (InMemoryBucketStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        (InMemoryBucketStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_first_access_starts_full() {
        let (store, _) = store();
        let gold = Policy::new("gold", 10, 1.0).unwrap();

        let decision = store.try_acquire("user-1", &[gold], 1).await.unwrap();

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9.0);
        assert_eq!(
            store.get_state("user-1", "gold").await.unwrap(),
            Some(BucketState::new(9.0, 0))
        );
    }

    #[tokio::test]
    async fn test_exhaust_then_refill() {
        let (store, clock) = store();
        let plan = [Policy::new("burst", 3, 1.0).unwrap()];

        for _ in 0..3 {
            assert!(store.try_acquire("k", &plan, 1).await.unwrap().allowed);
        }
        let denied = store.try_acquire("k", &plan, 1).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.wait, Duration::from_millis(1_000));

        clock.advance(Duration::from_millis(1_000));
        assert!(store.try_acquire("k", &plan, 1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_denial_leaves_other_plan_untouched() {
        let (store, _) = store();
        let x = Policy::new("x", 10, 1.0).unwrap();
        let y = Policy::new("y", 1, 1.0).unwrap();

        store.try_acquire("k", &[x.clone()], 1).await.unwrap();
        store.try_acquire("k", &[y.clone()], 1).await.unwrap();
        let before = store.get_state("k", "x").await.unwrap();
        assert_eq!(before, Some(BucketState::new(9.0, 0)));

        let decision = store.try_acquire("k", &[x, y], 1).await.unwrap();

        assert!(!decision.allowed);
        assert_eq!(decision.wait, Duration::from_millis(1_000));
        assert_eq!(store.get_state("k", "x").await.unwrap(), before);
        assert_eq!(
            store.get_state("k", "y").await.unwrap(),
            Some(BucketState::new(0.0, 0))
        );
    }

    #[tokio::test]
    async fn test_denied_first_access_stores_nothing() {
        let (store, _) = store();
        let tiny = Policy::new("tiny", 2, 1.0).unwrap();

        let decision = store.try_acquire("k", &[tiny], 5).await.unwrap();

        assert!(!decision.allowed);
        assert!(store.is_empty());
        assert_eq!(store.get_state("k", "tiny").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clock_going_backwards_does_not_refill() {
        let (store, clock) = store();
        let plan = [Policy::new("p", 1, 1.0).unwrap()];

        clock.set(100);
        assert!(store.try_acquire("k", &plan, 1).await.unwrap().allowed);

        clock.set(90);
        let decision = store.try_acquire("k", &plan, 1).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(
            store.get_state("k", "p").await.unwrap(),
            Some(BucketState::new(0.0, 100))
        );
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (store, _) = store();
        let plan = [Policy::new("p", 1, 1.0).unwrap()];

        assert!(store.try_acquire("a", &plan, 1).await.unwrap().allowed);
        assert!(store.try_acquire("b", &plan, 1).await.unwrap().allowed);
        assert!(!store.try_acquire("a", &plan, 1).await.unwrap().allowed);
        assert_eq!(store.len(), 2);

        store.clear();
        assert!(store.try_acquire("a", &plan, 1).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_idle_keys_are_evicted_after_full_refill() {
        let (store, clock) = store();
        let plan = [Policy::new("p", 10, 10.0).unwrap()];

        for i in 0..1_000 {
            store.try_acquire(&format!("user-{i}"), &plan, 1).await.unwrap();
        }
        assert_eq!(store.len(), 1_000);

        clock.advance(Duration::from_secs(3_600));
        assert!(store.try_acquire("late", &plan, 1).await.unwrap().allowed);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_state("user-0", "p").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_keeps_keys_still_refilling() {
        let (store, clock) = store();
        let fast = [Policy::new("fast", 10, 10.0).unwrap()];
        let both = [
            Policy::new("fast", 10, 10.0).unwrap(),
            Policy::new("slow", 10, 1.0).unwrap(),
        ];

        store.try_acquire("a", &fast, 1).await.unwrap();
        store.try_acquire("b", &both, 1).await.unwrap();

        // fast is full after 1s, slow only after 10s
        clock.advance(Duration::from_secs(2));
        assert_eq!(store.purge_idle(), 1);
        assert_eq!(store.get_state("a", "fast").await.unwrap(), None);
        assert!(store.get_state("b", "slow").await.unwrap().is_some());

        clock.advance(Duration::from_secs(8));
        assert_eq!(store.purge_idle(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_waits_for_interval() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryBucketStore::with_clock(clock.clone())
            .with_sweep_interval(Duration::from_secs(10));
        let plan = [Policy::new("p", 1, 1.0).unwrap()];

        store.try_acquire("a", &plan, 1).await.unwrap();
        clock.advance(Duration::from_secs(5));
        store.try_acquire("b", &plan, 1).await.unwrap();
        // "a" is idle but the interval has not passed yet
        assert_eq!(store.len(), 2);

        clock.advance(Duration::from_secs(5));
        store.try_acquire("c", &plan, 1).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_refill_time_never_evicts() {
        let (store, clock) = store();
        let plan = [Policy::new("slow", u64::MAX, 1e-300).unwrap()];

        store.try_acquire("k", &plan, 1).await.unwrap();
        clock.advance(Duration::from_secs(86_400 * 365));

        assert_eq!(store.purge_idle(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_never_over_admit() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryBucketStore::with_clock(clock));
        let plans = Arc::new(vec![
            Policy::new("minute", 50, 0.001).unwrap(),
            Policy::new("burst", 80, 0.001).unwrap(),
        ]);

        let tasks: Vec<_> = (0..200)
            .map(|_| {
                let store = store.clone();
                let plans = plans.clone();
                tokio::spawn(async move { store.try_acquire("shared", &plans, 1).await })
            })
            .collect();

        let mut allowed = 0;
        for result in futures::future::join_all(tasks).await {
            if result.unwrap().unwrap().allowed {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 50);
        assert_eq!(
            store.get_state("shared", "burst").await.unwrap(),
            Some(BucketState::new(30.0, 0))
        );
    }
}
