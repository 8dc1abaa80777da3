//! Subcommands and the state they share.

pub mod config;
pub mod keys;
pub mod projects;

use anyhow::{bail, Context as _, Result};
use std::path::{Path, PathBuf};

use toolhub_core::access::ApiKeyStore;
use toolhub_core::config::HubConfig;
use toolhub_core::telemetry::{MetricsConfig, TelemetryConfig};

use crate::output::OutputFormat;

const DEFAULT_CONFIG_FILE: &str = "toolhub.toml";

/// Global options resolved once per invocation.
pub struct Context {
    config_path: Option<PathBuf>,
    keys_file: Option<PathBuf>,
    pub format: OutputFormat,
}

impl Context {
    pub fn new(config_path: Option<PathBuf>, keys_file: Option<PathBuf>, format: OutputFormat) -> Self {
        Self {
            config_path: config_path.or_else(default_config_path),
            keys_file,
            format,
        }
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Load the hub configuration, with `TOOLHUB__*` overrides applied.
    pub fn load_config(&self) -> Result<HubConfig> {
        let path = self.config_path();
        HubConfig::load(path).with_context(|| match path {
            Some(path) => format!("Failed to load configuration from {}", path.display()),
            None => "Failed to load configuration from the environment".to_string(),
        })
    }

    /// Telemetry from `[logging]`, limited to warnings unless `verbose`.
    ///
    /// Falls back to defaults when the configuration does not load; the
    /// command itself reports that error.
    pub fn telemetry_config(&self, verbose: bool) -> TelemetryConfig {
        let config = self.load_config().unwrap_or_default();
        let mut logging = config.logging;
        if !verbose {
            logging.level = "warn".to_string();
        }
        TelemetryConfig {
            service_name: "toolhub-cli".to_string(),
            logging,
            // no exporter in a one-shot process
            metrics: MetricsConfig {
                enabled: false,
                ..config.metrics
            },
        }
    }

    /// Open the persistent key store named by `--keys-file` or `keys.store_path`.
    pub fn open_key_store(&self) -> Result<ApiKeyStore> {
        let path = match &self.keys_file {
            Some(path) => path.clone(),
            None => match self.load_config()?.keys.store_path {
                Some(path) => path,
                None => bail!(
                    "No key store configured; pass --keys-file or set keys.store_path in the configuration"
                ),
            },
        };
        ApiKeyStore::open(&path).with_context(|| format!("Failed to open key store {}", path.display()))
    }
}

/// `./toolhub.toml`, then `<config dir>/toolhub/toolhub.toml`, whichever exists.
fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("toolhub").join(DEFAULT_CONFIG_FILE))
        .filter(|path| path.is_file())
}
