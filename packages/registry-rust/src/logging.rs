//! Tracing subscriber bootstrap.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.filter`. Returns `false` if a
/// global subscriber was already installed, leaving that one in place.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
