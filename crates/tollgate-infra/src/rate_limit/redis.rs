//! Redis bucket store - one Lua script evaluates all plans of a key atomically.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};

use tollgate_core::domain::{BucketState, Decision, Policy};
use tollgate_core::ports::{BucketStore, StorageError};
use tollgate_core::support::RateLimitKey;

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fallback to the in-memory store if Redis is unavailable
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

impl RedisConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            fallback_to_memory: std::env::var("REDIS_FALLBACK_TO_MEMORY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(true),
        }
    }
}

/// Redis bucket store configuration.
#[derive(Debug, Clone)]
pub struct RedisBucketStoreConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Upper bound for one script round-trip
    pub command_timeout: Duration,
    /// Tenant segment of every bucket key
    pub tenant: String,
    /// Added to a plan's full refill time to get the bucket TTL
    pub ttl_slack: Duration,
    /// Wrap the identity in a cluster hash tag so multi-plan scripts stay in
    /// one slot. Required on Redis Cluster.
    pub hash_tag: bool,
}

impl Default for RedisBucketStoreConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            command_timeout: Duration::from_millis(250),
            tenant: "default".to_string(),
            ttl_slack: Duration::from_secs(60),
            hash_tag: false,
        }
    }
}

impl RedisBucketStoreConfig {
    pub fn from_env() -> Self {
        Self {
            redis: RedisConfig::from_env(),
            command_timeout: Duration::from_millis(
                std::env::var("RATE_LIMIT_COMMAND_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
            tenant: std::env::var("RATE_LIMIT_TENANT").unwrap_or_else(|_| "default".to_string()),
            ttl_slack: Duration::from_secs(
                std::env::var("RATE_LIMIT_TTL_SLACK_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            hash_tag: std::env::var("RATE_LIMIT_REDIS_HASH_TAG")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }
}

/// Redis-backed bucket store shared by every instance of a deployment.
///
/// Each bucket is a hash at `ratelimiter:{tenant}:{key}:{plan}` holding the
/// token count and last refill time. The acquisition script reads Redis'
/// own clock (`TIME`), so all instances refill against the same time source,
/// and because Redis runs scripts one at a time, concurrent callers on the
/// same key are linearized.
pub struct RedisBucketStore {
    conn: ConnectionManager,
    config: RedisBucketStoreConfig,
    /// Sent by SHA, re-uploaded automatically on NOSCRIPT.
    script: Script,
}

impl RedisBucketStore {
    pub async fn new(config: RedisBucketStoreConfig) -> Result<Self, StorageError> {
        let client = Client::open(config.redis.url.as_str())
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn = tokio::time::timeout(config.redis.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StorageError::Timeout(config.redis.connect_timeout))?
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let script = Script::new(include_str!("acquire_tokens.lua"));

        tracing::info!(url = %config.redis.url, tenant = %config.tenant, "Connected to Redis bucket store");

        Ok(Self {
            conn,
            config,
            script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(RedisBucketStoreConfig::from_env()).await
    }

    fn bucket_key(&self, key: &str, plan: &str) -> String {
        RateLimitKey::builder()
            .with_tenant(self.config.tenant.as_str())
            .with_user(key)
            .with_plan(plan)
            .with_hash_tag(self.config.hash_tag)
            .build()
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, RedisError>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.config.command_timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout(self.config.command_timeout))?
            .map_err(|e| classify(e, self.config.command_timeout))
    }
}

fn classify(e: RedisError, timeout: Duration) -> StorageError {
    if e.is_timeout() {
        StorageError::Timeout(timeout)
    } else if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() {
        StorageError::Connection(e.to_string())
    } else {
        StorageError::Script(e.to_string())
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, StorageError> {
    raw.parse()
        .map_err(|_| StorageError::Serialization(format!("invalid bucket field {field}: {raw:?}")))
}

#[async_trait]
impl BucketStore for RedisBucketStore {
    async fn try_acquire(
        &self,
        key: &str,
        policies: &[Policy],
        cost: u32,
    ) -> Result<Decision, StorageError> {
        let mut invocation = self.script.prepare_invoke();
        invocation
            .arg(cost)
            .arg(self.config.ttl_slack.as_millis() as u64);
        for policy in policies {
            invocation
                .key(self.bucket_key(key, policy.name()))
                .arg(policy.capacity())
                .arg(policy.refill_rate());
        }

        let mut conn = self.conn.clone();
        let (allowed, remaining, wait_ms, blocking): (i64, String, i64, usize) = self
            .with_timeout(invocation.invoke_async(&mut conn))
            .await?;

        let remaining: f64 = parse_number("remaining", &remaining)?;

        if allowed == 1 {
            return Ok(Decision::allow(remaining));
        }

        let plan = blocking
            .checked_sub(1)
            .and_then(|i| policies.get(i))
            .map(Policy::name)
            .ok_or_else(|| {
                StorageError::Serialization(format!("script returned invalid plan index {blocking}"))
            })?;

        Ok(Decision::deny(
            remaining,
            Duration::from_millis(wait_ms.max(0) as u64),
            plan,
        ))
    }

    async fn get_state(
        &self,
        key: &str,
        policy_name: &str,
    ) -> Result<Option<BucketState>, StorageError> {
        let bucket_key = self.bucket_key(key, policy_name);
        let mut conn = self.conn.clone();

        let (tokens, ts): (Option<String>, Option<String>) = self
            .with_timeout(conn.hget(&bucket_key, &["t", "ts"]))
            .await?;

        match (tokens, ts) {
            (Some(tokens), Some(ts)) => Ok(Some(BucketState::new(
                parse_number("t", &tokens)?,
                parse_number("ts", &ts)?,
            ))),
            _ => Ok(None),
        }
    }
}
