//! Built-in key resolution strategies.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ports::{KeyResolver, RequestSource};

/// Key used for callers that cannot be identified.
pub const ANONYMOUS_KEY: &str = "anonymous";

/// Plain request metadata, filled in by request adapters.
///
/// Header names are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    remote_address: Option<String>,
    principal: Option<String>,
    headers: HashMap<String, String>,
}

impl RequestMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }
}

impl RequestSource for RequestMetadata {
    fn remote_address(&self) -> Option<&str> {
        self.remote_address.as_deref()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
}

/// Identifies callers by a header value such as an API key.
/// Missing headers resolve to an empty string.
#[derive(Debug, Clone)]
pub struct HeaderKeyResolver {
    header_name: String,
}

impl HeaderKeyResolver {
    pub fn new(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }
}

impl KeyResolver for HeaderKeyResolver {
    fn resolve(&self, source: &dyn RequestSource) -> String {
        source
            .header(&self.header_name)
            .unwrap_or_default()
            .to_string()
    }
}

/// Identifies callers by authenticated principal, `anonymous` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrincipalKeyResolver;

impl KeyResolver for PrincipalKeyResolver {
    fn resolve(&self, source: &dyn RequestSource) -> String {
        source.principal().unwrap_or(ANONYMOUS_KEY).to_string()
    }
}

/// Identifies callers by network address, `anonymous` otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteAddrKeyResolver;

impl KeyResolver for RemoteAddrKeyResolver {
    fn resolve(&self, source: &dyn RequestSource) -> String {
        source.remote_address().unwrap_or(ANONYMOUS_KEY).to_string()
    }
}

/// Tries resolvers in order and returns the first non-empty key.
///
/// Typical chain: API key header, then principal, then remote address.
#[derive(Clone, Default)]
pub struct FallbackKeyResolver {
    chain: Vec<Arc<dyn KeyResolver>>,
}

impl FallbackKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, resolver: impl KeyResolver + 'static) -> Self {
        self.chain.push(Arc::new(resolver));
        self
    }
}

impl KeyResolver for FallbackKeyResolver {
    fn resolve(&self, source: &dyn RequestSource) -> String {
        self.chain
            .iter()
            .map(|resolver| resolver.resolve(source))
            .find(|key| !key.is_empty() && key != ANONYMOUS_KEY)
            .unwrap_or_else(|| ANONYMOUS_KEY.to_string())
    }
}
