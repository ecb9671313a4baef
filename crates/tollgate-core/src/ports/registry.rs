//! Plan registry port.

use crate::domain::Policy;

/// Resolves plan names to policies.
pub trait PlanRegistry: Send + Sync {
    /// Look up a plan by name, `None` if it is not registered.
    fn get_plan(&self, name: &str) -> Option<Policy>;
}
