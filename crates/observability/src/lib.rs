//! Tracing and logging (shared setup).

/// Initialize process-wide observability from the environment.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(&self::tracing::LogConfig::from_env());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

/// In-process log capture for tests.
pub mod capture;

pub use capture::{CapturedEvent, CapturedLogs};
pub use self::tracing::{LogConfig, LogFormat};
