//! Storage key naming convention.

use std::fmt;

const KEY_PREFIX: &str = "ratelimiter";
const DEFAULT_TENANT: &str = "default";
const DEFAULT_USER: &str = "anonymous";
const DEFAULT_PLAN: &str = "global";

/// Bucket key in the form `ratelimiter:{tenant}:{user}:{plan}`.
///
/// Unset or empty segments fall back to `default`, `anonymous` and `global`.
/// Backends that share a keyspace should use this format so keys stay stable
/// across deployments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitKey {
    tenant: Option<String>,
    user: Option<String>,
    plan: Option<String>,
    hash_tag: bool,
}

impl RateLimitKey {
    pub fn builder() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = Some(plan.into());
        self
    }

    /// Wrap the user segment in a Redis Cluster hash tag
    /// (`ratelimiter:acme:{user-1}:gold`) so all plan keys of one user
    /// map to the same slot.
    pub fn with_hash_tag(mut self, enabled: bool) -> Self {
        self.hash_tag = enabled;
        self
    }

    pub fn build(&self) -> String {
        self.to_string()
    }
}

fn segment<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().filter(|s| !s.is_empty()).unwrap_or(default)
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tenant = segment(&self.tenant, DEFAULT_TENANT);
        let user = segment(&self.user, DEFAULT_USER);
        let plan = segment(&self.plan, DEFAULT_PLAN);

        if self.hash_tag {
            write!(f, "{KEY_PREFIX}:{tenant}:{{{user}}}:{plan}")
        } else {
            write!(f, "{KEY_PREFIX}:{tenant}:{user}:{plan}")
        }
    }
}
