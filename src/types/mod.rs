//! Shared primitives used across the crate.

pub mod error;

pub use error::{EngineError, EngineResult};

/// Returns the current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
