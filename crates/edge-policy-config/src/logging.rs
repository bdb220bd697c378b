// crates/edge-policy-config/src/logging.rs
// ============================================================================
// Module: Logging Initialisation
// Description: Installs the process-wide tracing subscriber.
// Purpose: Give binaries one call that honours RUST_LOG and the config file.
// Dependencies: tracing-subscriber
// ============================================================================

//! ## Overview
//! Libraries only emit `tracing` events; binaries call [`init_logging`] once.
//! `RUST_LOG` wins over the configured level.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ConfigError;
use crate::config::LogFormat;
use crate::config::LoggingConfig;

/// Installs a fmt subscriber writing to stderr.
///
/// # Errors
/// Returns [`ConfigError::Invalid`] when the level does not form a filter or
/// a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|err| ConfigError::Invalid(format!("logging.level: {err}")))?,
    };
    let registry = tracing_subscriber::registry().with(filter);
    let installed = match config.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)).try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)).try_init(),
    };
    installed.map_err(|err| ConfigError::Invalid(format!("logging already initialised: {err}")))
}
