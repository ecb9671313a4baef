//! # Tollgate Core
//!
//! Token-bucket admission control with pluggable storage.
//! This crate holds the pure algorithm, the ports adapters implement, and the
//! orchestrator tying them together. It performs no I/O of its own.
//!
//! ```ignore
//! let limiter = DefaultRateLimiter::new(store, registry)
//!     .with_missing_plan_policy(MissingPlanPolicy::SkipWithWarn);
//! let decision = limiter.allow("user-42", &["free", "burst"], 1).await?;
//! ```

pub mod domain;
pub mod error;
pub mod ports;
pub mod service;
pub mod support;

pub use domain::{BucketState, Decision, Policy};
pub use error::{ConfigError, RateLimitError};
pub use service::DefaultRateLimiter;
pub use support::MissingPlanPolicy;
