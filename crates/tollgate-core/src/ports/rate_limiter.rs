//! Inbound rate limiting port.

use async_trait::async_trait;

use crate::domain::Decision;
use crate::error::RateLimitError;

/// Entry point used by request pipelines.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide whether `key` may spend `cost` tokens against every plan in
    /// `plan_names`.
    ///
    /// Returns `Err` only for configuration problems (unknown plans under a
    /// strict policy, zero cost). Infrastructure failures still produce an
    /// allowed decision.
    async fn allow(
        &self,
        key: &str,
        plan_names: &[&str],
        cost: u32,
    ) -> Result<Decision, RateLimitError>;
}
