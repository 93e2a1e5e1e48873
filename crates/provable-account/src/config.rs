//! SDK configuration
//!
//! Loaded from JSON handed over by the host, or from the process environment.

use crate::error::{Error, Result};
use provable_engine::NetworkType;
use serde::{Deserialize, Serialize};

/// Environment variable selecting the network
pub const ENV_NETWORK: &str = "PROVABLE_NETWORK";
/// Environment variable overriding the worker pool size
pub const ENV_WORKER_THREADS: &str = "PROVABLE_WORKER_THREADS";
/// Environment variable carrying the log filter
pub const ENV_LOG: &str = "PROVABLE_LOG";

const MAX_DEFAULT_WORKERS: usize = 4;

/// Top-level SDK configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Network the engine encodes material for
    pub network: NetworkType,
    /// `tracing` filter directive
    pub log_filter: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
    /// Worker pool settings
    pub dispatcher: DispatcherConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            network: NetworkType::default(),
            log_filter: "info".to_string(),
            json_logs: false,
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl SdkConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PROVABLE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(network) = lookup(ENV_NETWORK) {
            self.network = network
                .parse()
                .map_err(|e| Error::Config(format!("{ENV_NETWORK}: {e}")))?;
        }
        if let Some(threads) = lookup(ENV_WORKER_THREADS) {
            self.dispatcher.worker_threads = threads.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_WORKER_THREADS}: not a number: {threads}"))
            })?;
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject settings the SDK cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.worker_threads == 0 {
            return Err(Error::Config(
                "dispatcher.worker_threads must be at least 1".to_string(),
            ));
        }
        if self.dispatcher.thread_name.is_empty() {
            return Err(Error::Config(
                "dispatcher.thread_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Threads available to offloaded operations
    pub worker_threads: usize,
    /// Name prefix for pool threads
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().clamp(1, MAX_DEFAULT_WORKERS),
            thread_name: "provable-worker".to_string(),
        }
    }
}
