//! Subscriber setup for the `loadrec` binary.

use loadrec_core::LoggingConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let installed = match config.format.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(env_filter)
            .with_current_span(false)
            .try_init(),
        _ => fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    installed?;
    Ok(())
}
