// Logging setup for the binary and tests
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins over `verbose` when set.
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "songstream=debug" } else { "songstream=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
