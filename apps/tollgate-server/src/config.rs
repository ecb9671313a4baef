//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;

use tollgate_core::{ConfigError, MissingPlanPolicy, Policy};

#[cfg(feature = "redis")]
use tollgate_infra::RedisBucketStoreConfig;

/// Where bucket state lives.
#[derive(Debug, Clone)]
pub enum Backend {
    Memory,
    #[cfg(feature = "redis")]
    Redis(RedisBucketStoreConfig),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            #[cfg(feature = "redis")]
            Backend::Redis(_) => "redis",
        }
    }

    fn from_env() -> Self {
        let requested = env::var("RATE_LIMIT_BACKEND").unwrap_or_else(|_| "memory".to_string());

        match requested.to_ascii_lowercase().as_str() {
            #[cfg(feature = "redis")]
            "redis" => Backend::Redis(RedisBucketStoreConfig::from_env()),
            "memory" => Backend::Memory,
            other => {
                tracing::warn!(backend = %other, "Unsupported rate limit backend, using memory");
                Backend::Memory
            }
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Plans known to the registry.
    pub plans: Vec<Policy>,
    /// Plans the middleware enforces on every guarded request.
    pub default_plans: Vec<String>,
    pub missing_plan_policy: MissingPlanPolicy,
    /// Header carrying the caller's API key.
    pub key_header: String,
    /// Whether `key_header` identifies callers. Only safe when an upstream
    /// layer validates it; otherwise each new value gets a fresh bucket.
    pub trust_key_header: bool,
    pub backend: Backend,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let plans = parse_plans(
            &env::var("RATE_LIMIT_PLANS").unwrap_or_else(|_| "default:100:10".to_string()),
        )?;

        let default_plans = match env::var("RATE_LIMIT_DEFAULT_PLANS") {
            Ok(names) => parse_names(&names),
            Err(_) => plans
                .first()
                .map(|p| vec![p.name().to_string()])
                .unwrap_or_default(),
        };

        let missing_plan_policy = match env::var("RATE_LIMIT_MISSING_PLAN_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => MissingPlanPolicy::default(),
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            plans,
            default_plans,
            missing_plan_policy,
            key_header: env::var("RATE_LIMIT_KEY_HEADER")
                .unwrap_or_else(|_| "X-API-Key".to_string()),
            trust_key_header: env::var("RATE_LIMIT_TRUST_KEY_HEADER")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            backend: Backend::from_env(),
        })
    }
}

/// Parse a comma-separated list of `name:capacity:rate` plans.
pub fn parse_plans(raw: &str) -> Result<Vec<Policy>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Policy::from_str)
        .collect()
}

fn parse_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plans() {
        let plans = parse_plans("gold:1000:16.67, burst:20:20").unwrap();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].name(), "gold");
        assert_eq!(plans[0].capacity(), 1000);
        assert_eq!(plans[1].refill_rate(), 20.0);
    }

    #[test]
    fn test_parse_plans_rejects_invalid_entry() {
        assert!(parse_plans("gold:1000:16.67,broken").is_err());
        assert!(parse_plans("zero:0:1").is_err());
    }

    #[test]
    fn test_parse_names_skips_blanks() {
        assert_eq!(parse_names("gold, ,burst,"), vec!["gold", "burst"]);
    }
}
