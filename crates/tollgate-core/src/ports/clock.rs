//! Time source port.

/// Wall clock in epoch milliseconds.
///
/// Backends that compute refills locally take a `Clock` so every bucket of a
/// deployment is measured against the same time source.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}
