//! Logging setup.
//!
//! Both binaries call [`init`] once at startup. Verbosity is controlled by
//! `RUST_LOG` (the `tracing-subscriber` convention), defaulting to `info`
//! for this crate and `warn` for dependencies.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Idempotent in spirit (a second call elsewhere in a test binary is a
/// no-op) but not guarded: callers are expected to call this exactly once,
/// from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conflowci=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
