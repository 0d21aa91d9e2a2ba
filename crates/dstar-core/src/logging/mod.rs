//! Tracing subscriber setup.
//!
//! Diagnostics go through `tracing` with structured fields. Binaries call
//! [`init_subscriber`] once at startup; tests use [`capture_logs`] to assert
//! on emitted events without touching the global subscriber.

pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Level used when neither `RUST_LOG` nor settings name one.
pub const DEFAULT_LEVEL: &str = "warn";

/// Initialize the global tracing subscriber, writing compact lines to stderr.
///
/// `RUST_LOG` takes precedence over `level`. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Build a filter from a level string, falling back to [`DEFAULT_LEVEL`] when
/// the string is not a valid directive.
fn filter_for(level: &str) -> tracing_subscriber::EnvFilter {
    use tracing_subscriber::EnvFilter;

    EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
