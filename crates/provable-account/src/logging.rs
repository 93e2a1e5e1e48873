//! Logging setup
//!
//! The SDK only emits `tracing` events; hosts that do not install their own
//! subscriber can call [`init_logging`] once at startup.

use crate::config::SdkConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber filtered by `filter`.
///
/// Returns `false` if a global subscriber was already installed; the call is
/// then a no-op. An unparsable filter falls back to `info`.
pub fn init_logging(filter: &str, json: bool) -> bool {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    let installed = if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        info!(filter, json, "Logging initialized");
    }
    installed
}

/// [`init_logging`] with the settings from `config`.
pub fn init_from_config(config: &SdkConfig) -> bool {
    init_logging(&config.log_filter, config.json_logs)
}
