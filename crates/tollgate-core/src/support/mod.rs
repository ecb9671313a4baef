//! Ready-made implementations of the core ports and configuration helpers.

mod key;
mod key_resolvers;
mod missing_plan;
mod plan_registry;

pub use key::RateLimitKey;
pub use key_resolvers::{
    ANONYMOUS_KEY, FallbackKeyResolver, HeaderKeyResolver, PrincipalKeyResolver,
    RemoteAddrKeyResolver, RequestMetadata,
};
pub use missing_plan::MissingPlanPolicy;
pub use plan_registry::InMemoryPlanRegistry;
