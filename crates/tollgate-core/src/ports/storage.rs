//! Bucket storage port.

use async_trait::async_trait;

use crate::domain::{BucketState, Decision, Policy};

/// Storage backend for bucket state - abstraction over in-memory and remote stores.
///
/// Implementations must evaluate all `policies` for a key as one atomic unit
/// with respect to concurrent callers on the same key: either every bucket
/// reflects this call's deduction, or (when any policy denies) none does.
/// The aggregation rules are those of [`crate::domain::evaluate_plans`].
///
/// Time is sourced by the backend and expressed in epoch milliseconds.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Refill and consume `cost` tokens from every policy's bucket for `key`.
    async fn try_acquire(
        &self,
        key: &str,
        policies: &[Policy],
        cost: u32,
    ) -> Result<Decision, StorageError>;

    /// Current stored state of one bucket, without refilling it.
    async fn get_state(
        &self,
        key: &str,
        policy_name: &str,
    ) -> Result<Option<BucketState>, StorageError>;
}

/// Storage backend failures. All of these end in a fail-open decision.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Script execution failed: {0}")]
    Script(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
