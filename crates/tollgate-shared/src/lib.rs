//! # Tollgate Shared
//!
//! Wire types of the admission gateway. Kept free of core types so clients
//! can depend on this crate alone.

pub mod dto;
pub mod response;

pub use dto::{BucketStateResponse, CheckRequest, DecisionResponse};
pub use response::ErrorResponse;
