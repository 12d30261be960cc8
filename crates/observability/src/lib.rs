//! Process-wide tracing setup shared by the binaries.

pub mod tracing;

pub use crate::tracing::{LogFormat, TracingConfig};

/// Initialize tracing with settings taken from the environment
/// (`RUST_LOG`, `LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    crate::tracing::init(&TracingConfig::from_env());
}
