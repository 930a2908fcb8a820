//! Logging init: structured tracing to stderr with env-filter overrides.

use tracing_subscriber::EnvFilter;

/// Initialize logging to stderr. Honors `RUST_LOG`; defaults to
/// `info` globally with `debug` for thumbgen crates.
pub fn init_stderr() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,thumbgen=debug"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
