//! Tracing instrumentation helpers.
//!
//! The core never installs a global subscriber on its own — that decision
//! belongs to the host application or, in tests, to the harness. This
//! module only provides the `tracing` spans state-manager operations emit
//! and a convenience initializer for tests and examples.

/// Installs a `tracing-subscriber` writer suitable for `cargo test` output.
/// Safe to call from multiple test threads; only the first call wins.
pub fn init_test_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
