use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::LogFormat;
use crate::error::CliError;

/// Install the stderr subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init(verbose: bool, format: LogFormat) -> Result<(), CliError> {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{level},h2=warn,hyper=warn,reqwest=warn")))
        .map_err(|error| CliError::Logging(format!("invalid log filter: {error}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(verbose)
                    .with_writer(io::stderr),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_writer(io::stderr),
            )
            .try_init(),
    };

    installed.map_err(|error| CliError::Logging(error.to_string()))
}
