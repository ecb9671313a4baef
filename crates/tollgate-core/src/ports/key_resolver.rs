//! Identity resolution ports.

/// Framework-neutral view of an incoming request.
///
/// HTTP (or other) adapters implement this so key resolvers never see
/// framework types.
pub trait RequestSource {
    /// Network address of the caller.
    fn remote_address(&self) -> Option<&str>;

    /// Value of a request header, if present.
    fn header(&self, name: &str) -> Option<&str>;

    /// Authenticated principal, `None` for anonymous requests.
    fn principal(&self) -> Option<&str>;
}

/// Strategy mapping a request to the identity key being rate limited.
///
/// Implementations must be stateless or immutable; they are shared across
/// threads. A resolver always returns a key: anonymous callers get an empty
/// string or a sentinel such as `"anonymous"`, never an error.
pub trait KeyResolver: Send + Sync {
    fn resolve(&self, source: &dyn RequestSource) -> String;
}
