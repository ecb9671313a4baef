//! # Tollgate Infrastructure
//!
//! Concrete implementations of the ports defined in `tollgate-core`:
//! bucket stores, clocks and event listeners.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All features enabled
//! - `minimal` - No external dependencies, in-memory only
//! - `redis` - Redis bucket store

pub mod clock;
pub mod events;
pub mod rate_limit;

// Re-exports - In-Memory
pub use clock::{ManualClock, SystemClock};
pub use events::{CountingEventListener, EventCounts, TracingEventListener};
pub use rate_limit::InMemoryBucketStore;

// Re-exports - Redis
#[cfg(feature = "redis")]
pub use rate_limit::{RedisBucketStore, RedisBucketStoreConfig, RedisConfig};
