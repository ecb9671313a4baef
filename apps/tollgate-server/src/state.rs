//! Application state - shared across all handlers.

use std::sync::Arc;

use tollgate_core::DefaultRateLimiter;
use tollgate_core::ports::{BucketStore, KeyResolver, StorageError};
use tollgate_core::support::{
    FallbackKeyResolver, HeaderKeyResolver, InMemoryPlanRegistry, PrincipalKeyResolver,
    RemoteAddrKeyResolver,
};
use tollgate_infra::{CountingEventListener, InMemoryBucketStore, TracingEventListener};

#[cfg(feature = "redis")]
use tollgate_infra::RedisBucketStore;

use crate::config::{AppConfig, Backend};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub limiter: Arc<DefaultRateLimiter>,
    pub registry: Arc<InMemoryPlanRegistry>,
    pub counters: Arc<CountingEventListener>,
    pub key_resolver: Arc<dyn KeyResolver>,
    /// Plans enforced by the admission middleware.
    pub default_plans: Arc<Vec<String>>,
    pub backend: &'static str,
}

impl AppState {
    /// Build the application state, connecting to the configured backend.
    pub async fn new(config: &AppConfig) -> Result<Self, StorageError> {
        let (store, backend): (Arc<dyn BucketStore>, &'static str) = match &config.backend {
            Backend::Memory => {
                tracing::info!("Using in-memory bucket store (limits are per process)");
                (Arc::new(InMemoryBucketStore::new()), "memory")
            }
            #[cfg(feature = "redis")]
            Backend::Redis(redis_config) => match RedisBucketStore::new(redis_config.clone()).await
            {
                Ok(store) => (Arc::new(store), "redis"),
                Err(e) if redis_config.redis.fallback_to_memory => {
                    tracing::error!(
                        "Failed to connect to Redis: {}. Using in-memory fallback.",
                        e
                    );
                    (Arc::new(InMemoryBucketStore::new()), "memory")
                }
                Err(e) => return Err(e),
            },
        };

        let state = Self::with_store(config, store, backend);
        tracing::info!(
            backend = state.backend,
            plans = ?state.registry.names(),
            default_plans = ?state.default_plans,
            "Application state initialized"
        );
        Ok(state)
    }

    /// Assemble the state around an already built store.
    pub fn with_store(
        config: &AppConfig,
        store: Arc<dyn BucketStore>,
        backend: &'static str,
    ) -> Self {
        let registry = Arc::new(InMemoryPlanRegistry::from_policies(
            config.plans.iter().cloned(),
        ));
        let counters = Arc::new(CountingEventListener::new());

        let limiter = DefaultRateLimiter::new(store, registry.clone())
            .with_listener(Arc::new(TracingEventListener))
            .with_listener(counters.clone())
            .with_missing_plan_policy(config.missing_plan_policy);

        // The header is client controlled; it only counts when trusted.
        let mut key_resolver = FallbackKeyResolver::new().then(PrincipalKeyResolver);
        if config.trust_key_header {
            key_resolver = key_resolver.then(HeaderKeyResolver::new(config.key_header.as_str()));
        } else {
            tracing::debug!(header = %config.key_header, "API key header not trusted for rate limit keys");
        }
        let key_resolver = key_resolver.then(RemoteAddrKeyResolver);

        Self {
            limiter: Arc::new(limiter),
            registry,
            counters,
            key_resolver: Arc::new(key_resolver),
            default_plans: Arc::new(config.default_plans.clone()),
            backend,
        }
    }
}
