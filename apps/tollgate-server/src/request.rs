//! Adapts actix requests to the framework-neutral request view.

use actix_web::{HttpMessage, HttpRequest};

use tollgate_core::support::RequestMetadata;

/// Extension set by an authentication layer in front of the limiter.
#[derive(Debug, Clone)]
pub struct Principal(pub String);

pub fn request_metadata(req: &HttpRequest) -> RequestMetadata {
    let mut metadata = RequestMetadata::new();

    if let Some(addr) = req.connection_info().realip_remote_addr() {
        metadata = metadata.with_remote_address(addr);
    }

    if let Some(principal) = req.extensions().get::<Principal>() {
        metadata = metadata.with_principal(principal.0.as_str());
    }

    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            metadata = metadata.with_header(name.as_str(), value);
        }
    }

    metadata
}
