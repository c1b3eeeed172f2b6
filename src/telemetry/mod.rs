use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber from the environment.
///
/// Falls back to `info` when `RUST_LOG` is unset or malformed. Safe to call
/// once per process; subsequent calls are ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sleuth=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
