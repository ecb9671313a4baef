//! Application services built on the ports.

mod limiter;

pub use limiter::DefaultRateLimiter;
