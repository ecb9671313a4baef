//! Ports - trait definitions for the pluggable parts of the limiter.
//! Adapters (storage backends, request adapters, observers) implement these.

mod clock;
mod events;
mod key_resolver;
mod rate_limiter;
mod registry;
mod storage;

pub use clock::Clock;
pub use events::RateLimitEventListener;
pub use key_resolver::{KeyResolver, RequestSource};
pub use rate_limiter::RateLimiter;
pub use registry::PlanRegistry;
pub use storage::{BucketStore, StorageError};
