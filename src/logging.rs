//! Logging setup.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_LOG: Once = Once::new();

/// Installs a global `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"ranexec=debug"`). Only the first
/// call has an effect.
pub fn init_logging(default_directive: &str) {
    INIT_LOG.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

        // Another subscriber may already be installed by the embedding
        // application or a test harness.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_thread_names(true)
            .with_target(true)
            .try_init();
    });
}
