//! # Plugins
//!
//! Backend integrations are plugins. A plugin type knows how to talk to one
//! kind of backend and nothing about multi-tenancy: it is constructed once per
//! configured project and the hub routes calls to it.
//!
//! ## Architecture
//!
//! - **Plugin trait**: the contract every plugin type satisfies (static
//!   capability list, required settings, method table, async health check).
//! - **Capability**: declarative description of one callable operation.
//! - **Method table**: named async methods built once per type.
//! - **Registry**: plugin type id → constructor, with contract validation.
//!
//! ## Example
//!
//! ```rust,ignore
//! struct Gitea { url: String }
//!
//! #[async_trait]
//! impl Plugin for Gitea {
//!     fn capabilities() -> Vec<CapabilitySpec> {
//!         vec![CapabilitySpec::new("list_repos", "List repositories")]
//!     }
//!     fn required_config_keys() -> Vec<&'static str> { vec!["url", "token"] }
//!     fn methods() -> MethodTable<Self> {
//!         MethodTable::new().method("list_repos", |g: Arc<Self>, _args| async move {
//!             Ok(json!({ "url": g.url }))
//!         })
//!     }
//!     fn from_config(_: &ProjectId, config: &PluginConfig) -> Result<Self, PluginError> {
//!         Ok(Self { url: config.require_str("url")?.to_string() })
//!     }
//! }
//! ```

pub mod capability;
pub mod methods;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::access::ProjectId;

pub use capability::{empty_object_schema, is_identifier, CapabilityError, CapabilitySpec, SITE_FIELD};
pub use methods::{MethodFuture, MethodTable, PluginInstance};
pub use registry::{PluginRegistry, PluginTypeDescriptor, RegistryError};

/// JSON object arguments passed to a plugin method.
pub type Arguments = Map<String, Value>;

// ═══════════════════════════════════════════════════════════════════════════════
// Plugin Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// The contract every plugin type implements.
///
/// Capability and settings declarations are associated functions so they can
/// be read without constructing an instance.
#[async_trait]
pub trait Plugin: Send + Sync + Sized + 'static {
    /// Operations this plugin type offers.
    fn capabilities() -> Vec<CapabilitySpec>;

    /// Settings that must be present for construction to be attempted.
    fn required_config_keys() -> Vec<&'static str> {
        Vec::new()
    }

    /// Named async methods referenced by [`CapabilitySpec::method_name`].
    fn methods() -> MethodTable<Self>;

    /// Build an instance for one project.
    fn from_config(project_id: &ProjectId, config: &PluginConfig) -> Result<Self, PluginError>;

    /// Report backend reachability.
    async fn health_check(&self) -> PluginHealth {
        PluginHealth::default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Plugin Config
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings blob for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginConfig(Map<String, Value>);

impl PluginConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Present, non-null and not an empty string.
    pub fn contains(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }

    pub fn require_str(&self, key: &str) -> Result<&str, PluginError> {
        self.get_str(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PluginError::MissingSetting(key.to_string()))
    }

    /// Keys from `required` that are not set.
    pub fn missing<'a>(&self, required: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        required
            .into_iter()
            .filter(|key| !self.contains(key))
            .map(str::to_string)
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for PluginConfig {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Plugin Health
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a plugin health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginHealth {
    pub healthy: bool,
    pub message: String,
}

impl PluginHealth {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            healthy: true,
            message: message.into(),
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: message.into(),
        }
    }
}

impl Default for PluginHealth {
    fn default() -> Self {
        Self::healthy("Health check not implemented")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Plugin Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors produced by plugin construction and plugin methods.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("missing required setting '{0}'")]
    MissingSetting(String),

    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Upstream(String),
}

impl PluginError {
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Argument Helpers
// ═══════════════════════════════════════════════════════════════════════════════

/// Typed accessors for method arguments.
pub trait ArgumentsExt {
    fn required_str(&self, name: &str) -> Result<&str, PluginError>;
    fn optional_str(&self, name: &str) -> Option<&str>;
    fn optional_u64(&self, name: &str) -> Option<u64>;
    fn optional_bool(&self, name: &str) -> Option<bool>;
}

impl ArgumentsExt for Arguments {
    fn required_str(&self, name: &str) -> Result<&str, PluginError> {
        self.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| PluginError::InvalidArguments(format!("'{}' must be a string", name)))
    }

    fn optional_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    fn optional_u64(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(Value::as_u64)
    }

    fn optional_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_missing_keys() {
        let config = PluginConfig::new()
            .with("url", "https://example.com")
            .with("username", "")
            .with("token", Value::Null);

        assert!(config.contains("url"));
        assert!(!config.contains("username"));
        assert_eq!(
            config.missing(["url", "username", "token"]),
            vec!["username".to_string(), "token".to_string()]
        );
        assert!(config.require_str("username").is_err());
    }

    #[test]
    fn test_config_typed_getters() {
        let config: PluginConfig = serde_json::from_value(json!({
            "verify_ssl": "false",
            "timeout": "30",
            "port": 5432
        }))
        .unwrap();

        assert_eq!(config.get_bool("verify_ssl"), Some(false));
        assert_eq!(config.get_u64("timeout"), Some(30));
        assert_eq!(config.get_u64("port"), Some(5432));
        assert_eq!(config.get_u64("missing"), None);
    }

    #[test]
    fn test_default_health() {
        let health = PluginHealth::default();
        assert!(health.healthy);
        assert_eq!(health.message, "Health check not implemented");
    }

    #[test]
    fn test_arguments_ext() {
        let args = json!({ "id": "42", "per_page": 5, "draft": true });
        let args = args.as_object().unwrap();

        assert_eq!(args.required_str("id").unwrap(), "42");
        assert!(args.required_str("per_page").is_err());
        assert_eq!(args.optional_u64("per_page"), Some(5));
        assert_eq!(args.optional_bool("draft"), Some(true));
        assert_eq!(args.optional_str("missing"), None);
    }
}
