//! Configuration management for ToolHub.
//!
//! Configuration is layered: an optional TOML file first, then environment
//! variables prefixed with `TOOLHUB__` using `__` as the section separator
//! (`TOOLHUB__RATE_LIMIT__REQUESTS_PER_MINUTE=120`).
//!
//! ```toml
//! [[projects]]
//! plugin_type = "wordpress"
//! site_id = "mainsite"
//! aliases = ["blog"]
//!
//! [projects.settings]
//! url = "https://blog.example.com"
//!
//! [rate_limit]
//! requests_per_minute = 120
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::access::{KeyStoreConfig, ProjectId};
use crate::audit::AuditConfig;
use crate::catalog::{CatalogConfig, ProjectConfig};
use crate::dispatch::RateLimitConfig;
use crate::health::HealthConfig;
use crate::plugins::{PluginConfig, PluginRegistry};
use crate::telemetry::{LoggingConfig, MetricsConfig};

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "TOOLHUB";

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("project #{index} has an empty {field}")]
    EmptyField { index: usize, field: &'static str },

    #[error("project '{0}' is configured more than once")]
    DuplicateProject(ProjectId),

    #[error("{0} must be greater than zero")]
    NonPositive(&'static str),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sections
// ═══════════════════════════════════════════════════════════════════════════════

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub keys: KeyStoreConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub health: HealthConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// One `[[projects]]` record.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectEntry {
    /// Defaults to `{plugin_type}_{site_id}`
    #[serde(default)]
    pub id: Option<String>,

    pub plugin_type: String,

    pub site_id: String,

    #[serde(default)]
    pub aliases: Vec<String>,

    #[serde(default)]
    pub settings: PluginConfig,
}

impl ProjectEntry {
    pub fn project_id(&self) -> ProjectId {
        match &self.id {
            Some(id) if !id.trim().is_empty() => ProjectId::new(id.trim()),
            _ => ProjectId::for_site(&self.plugin_type, &self.site_id),
        }
    }

    pub fn to_project_config(&self) -> ProjectConfig {
        ProjectConfig {
            id: self.project_id(),
            plugin_type: self.plugin_type.trim().to_lowercase(),
            site_id: self.site_id.trim().to_string(),
            aliases: self.aliases.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// `[discovery]`: projects declared through `{PLUGIN}_{SITE}_{KEY}` variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Plugin types to scan for in addition to the registered ones
    #[serde(default)]
    pub plugin_types: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            plugin_types: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ═══════════════════════════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════════════════════════

impl HubConfig {
    /// Load from an optional file plus `TOOLHUB__*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Structural checks that do not need the plugin registry.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, entry) in self.projects.iter().enumerate() {
            if entry.plugin_type.trim().is_empty() {
                return Err(ConfigError::EmptyField {
                    index,
                    field: "plugin_type",
                });
            }
            if entry.site_id.trim().is_empty() {
                return Err(ConfigError::EmptyField { index, field: "site_id" });
            }
            let id = entry.project_id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateProject(id));
            }
        }

        if self.rate_limit.enabled && self.rate_limit.requests_per_minute == 0 {
            return Err(ConfigError::NonPositive("rate_limit.requests_per_minute"));
        }
        if self.catalog.construction_timeout.is_zero() {
            return Err(ConfigError::NonPositive("catalog.construction_timeout"));
        }
        if self.health.check_timeout.is_zero() {
            return Err(ConfigError::NonPositive("health.check_timeout"));
        }
        if self.audit.enabled && self.audit.recent_capacity == 0 {
            return Err(ConfigError::NonPositive("audit.recent_capacity"));
        }
        if self.audit.enabled && self.audit.channel_buffer_size == 0 {
            return Err(ConfigError::NonPositive("audit.channel_buffer_size"));
        }
        Ok(())
    }

    /// Configured projects in file order.
    pub fn project_configs(&self) -> Vec<ProjectConfig> {
        self.projects.iter().map(ProjectEntry::to_project_config).collect()
    }

    /// Plugin types referenced by `[[projects]]` that `registry` does not know.
    pub fn unknown_plugin_types(&self, registry: &PluginRegistry) -> Vec<String> {
        let mut unknown: Vec<String> = self
            .projects
            .iter()
            .map(|p| p.plugin_type.trim().to_lowercase())
            .filter(|t| !registry.contains(t))
            .collect();
        unknown.sort();
        unknown.dedup();
        unknown
    }

    /// Plugin types environment discovery should scan for, given the
    /// registered ones.
    pub fn discovery_types<'a>(&'a self, registered: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut types: Vec<String> = registered
            .into_iter()
            .map(str::to_string)
            .chain(self.discovery.plugin_types.iter().map(|t| t.trim().to_lowercase()))
            .filter(|t| !t.is_empty())
            .collect();
        types.sort();
        types.dedup();
        types
    }
}
