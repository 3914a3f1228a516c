//! Shared helpers for the integration tests.

/// Installs a test-friendly tracing subscriber; safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}
