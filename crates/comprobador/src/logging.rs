//! Tracing subscriber setup

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG`, else from the verbosity level
#[must_use]
pub fn env_filter(config: &CliConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.verbosity.log_filter()))
}

/// Install the global subscriber. Logs go to stderr.
pub fn init_logging(config: &CliConfig) -> CliResult<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let result = if config.log_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(config.color.should_color())
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    result.map_err(|e| CliError::config(format!("logging: {e}")))
}
