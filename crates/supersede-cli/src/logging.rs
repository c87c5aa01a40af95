//! Tracing setup for the binary.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive string.
pub const LOG_ENV: &str = "SUPERSEDE_LOG";

/// Installs a stderr `fmt` subscriber.
///
/// `SUPERSEDE_LOG` wins over `fallback` (the config's `log_level`). Calling
/// this twice is harmless; the second call is ignored.
pub fn init(fallback: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
