//! In-memory plan registry.

use dashmap::DashMap;

use crate::domain::Policy;
use crate::ports::PlanRegistry;

/// Thread-safe registry for plans known at startup or registered at runtime.
#[derive(Debug, Default)]
pub struct InMemoryPlanRegistry {
    plans: DashMap<String, Policy>,
}

impl InMemoryPlanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_policies(policies: impl IntoIterator<Item = Policy>) -> Self {
        let registry = Self::new();
        for policy in policies {
            registry.register(policy);
        }
        registry
    }

    /// Register a plan, replacing any plan with the same name.
    pub fn register(&self, policy: Policy) {
        tracing::debug!(plan = %policy.name(), capacity = policy.capacity(), rate = policy.refill_rate(), "Plan registered");
        self.plans.insert(policy.name().to_string(), policy);
    }

    pub fn remove(&self, name: &str) -> Option<Policy> {
        self.plans.remove(name).map(|(_, policy)| policy)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }

    /// Registered plan names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plans.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl PlanRegistry for InMemoryPlanRegistry {
    fn get_plan(&self, name: &str) -> Option<Policy> {
        self.plans.get(name).map(|entry| entry.value().clone())
    }
}
