//! Configuration and call-level error types.
//!
//! Storage failures are deliberately absent here: they never reach the
//! caller of [`crate::service::DefaultRateLimiter::allow`], which converts them
//! into fail-open decisions. See [`crate::ports::StorageError`].

use thiserror::Error;

/// Invalid plan configuration, rejected when the [`crate::domain::Policy`] is built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Plan name must not be empty")]
    EmptyName,

    #[error("Plan name [{0}] must not contain ':'")]
    InvalidName(String),

    #[error("Capacity of plan [{name}] must be greater than zero")]
    InvalidCapacity { name: String },

    #[error("Refill rate of plan [{name}] must be a positive number, got {rate}")]
    InvalidRefillRate { name: String, rate: f64 },

    #[error("Malformed plan definition [{0}], expected name:capacity:rate")]
    Malformed(String),

    #[error("Unknown missing plan policy [{0}]")]
    UnknownMissingPlanPolicy(String),
}

/// Errors that abort a rate limit check instead of producing a decision.
///
/// These indicate a caller or configuration bug and are never swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit plan [{plan}] not found for key [{key}]")]
    PlanNotFound { plan: String, key: String },

    #[error("No valid plans found for key [{key}] and policy RequireAtLeastOne")]
    NoPlansResolved { key: String },

    #[error("Request cost must be at least 1")]
    InvalidCost,
}
