use std::io;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Honors `RUST_LOG`; plain output in debug
/// builds, JSON lines in release builds. Diagnostics go to stderr so stdout
/// stays free for tool output. Safe to call more than once.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if cfg!(debug_assertions) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .with_target(false)
            .with_writer(io::stderr)
            .try_init();
    }
}
