//! Plugin type registration and instantiation.
//!
//! The [`PluginRegistry`] maps plugin type ids to constructors. Registration
//! validates the type's contract once; afterwards the registry is read-only
//! and shared behind an `Arc`.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use super::capability::{is_identifier, CapabilitySpec};
use super::methods::{Bound, ErasedPlugin, PluginInstance};
use super::{Plugin, PluginConfig, PluginError};
use crate::access::ProjectId;

// ═══════════════════════════════════════════════════════════════════════════════
// Descriptor
// ═══════════════════════════════════════════════════════════════════════════════

/// Static description of a registered plugin type.
#[derive(Debug, Clone, Serialize)]
pub struct PluginTypeDescriptor {
    pub type_id: String,
    pub required_config_keys: Vec<String>,
    pub capabilities: Vec<CapabilitySpec>,
}

type Constructor =
    Arc<dyn Fn(&ProjectId, &PluginConfig) -> Result<Arc<dyn ErasedPlugin>, PluginError> + Send + Sync>;

struct RegisteredType {
    descriptor: Arc<PluginTypeDescriptor>,
    construct: Constructor,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("plugin type '{0}' is already registered")]
    DuplicateType(String),

    #[error("plugin type '{type_id}' violates the plugin contract: {reason}")]
    ContractViolation { type_id: String, reason: String },

    #[error("plugin type '{0}' is not registered")]
    UnknownType(String),

    #[error("project '{project_id}' ({type_id}) is missing required settings: {}", missing.join(", "))]
    MissingConfig {
        type_id: String,
        project_id: String,
        missing: Vec<String>,
    },

    #[error("failed to construct {type_id} plugin for project '{project_id}': {source}")]
    Construction {
        type_id: String,
        project_id: String,
        source: PluginError,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Plugin Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Plugin type id → constructor.
///
/// Iteration order is sorted by type id so tool generation is deterministic.
#[derive(Default)]
pub struct PluginRegistry {
    types: BTreeMap<String, RegisteredType>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────────────────────

    /// Register plugin type `P` under `type_id`.
    pub fn register<P: Plugin>(&mut self, type_id: &str) -> Result<Arc<PluginTypeDescriptor>, RegistryError> {
        if self.types.contains_key(type_id) {
            return Err(RegistryError::DuplicateType(type_id.to_string()));
        }

        let violation = |reason: String| RegistryError::ContractViolation {
            type_id: type_id.to_string(),
            reason,
        };

        if !is_identifier(type_id) {
            return Err(violation("type id must be a lowercase identifier".into()));
        }

        let capabilities = P::capabilities();
        let methods = Arc::new(P::methods());

        let mut seen = HashSet::with_capacity(capabilities.len());
        for capability in &capabilities {
            capability.validate().map_err(|e| violation(e.to_string()))?;
            if !seen.insert(capability.name.as_str()) {
                return Err(violation(format!(
                    "capability '{}' is declared more than once",
                    capability.name
                )));
            }
            if !methods.contains(&capability.method_name) {
                return Err(violation(format!(
                    "capability '{}' references method '{}' which is not in the method table",
                    capability.name, capability.method_name
                )));
            }
        }

        let descriptor = Arc::new(PluginTypeDescriptor {
            type_id: type_id.to_string(),
            required_config_keys: P::required_config_keys()
                .into_iter()
                .map(str::to_string)
                .collect(),
            capabilities,
        });

        let construct: Constructor = Arc::new(move |project_id: &ProjectId, config: &PluginConfig| {
            let plugin = P::from_config(project_id, config)?;
            Ok(Arc::new(Bound::new(plugin, Arc::clone(&methods))) as Arc<dyn ErasedPlugin>)
        });

        info!(
            plugin_type = type_id,
            capabilities = descriptor.capabilities.len(),
            "Plugin type registered"
        );

        self.types.insert(
            type_id.to_string(),
            RegisteredType {
                descriptor: Arc::clone(&descriptor),
                construct,
            },
        );
        Ok(descriptor)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Instantiation
    // ─────────────────────────────────────────────────────────────────────────

    /// Construct an instance of `type_id` for `project_id`.
    ///
    /// Runs the plugin constructor synchronously; callers on the async path
    /// should run it on a blocking thread.
    pub fn create_instance(
        &self,
        type_id: &str,
        project_id: &ProjectId,
        config: &PluginConfig,
    ) -> Result<PluginInstance, RegistryError> {
        let registered = self
            .types
            .get(type_id)
            .ok_or_else(|| RegistryError::UnknownType(type_id.to_string()))?;

        let missing = config.missing(
            registered
                .descriptor
                .required_config_keys
                .iter()
                .map(String::as_str),
        );
        if !missing.is_empty() {
            return Err(RegistryError::MissingConfig {
                type_id: type_id.to_string(),
                project_id: project_id.to_string(),
                missing,
            });
        }

        let start = Instant::now();
        let inner = (registered.construct)(project_id, config).map_err(|source| {
            RegistryError::Construction {
                type_id: type_id.to_string(),
                project_id: project_id.to_string(),
                source,
            }
        })?;

        debug!(
            plugin_type = type_id,
            project_id = %project_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Plugin instance constructed"
        );
        Ok(PluginInstance::new(inner, type_id, project_id.clone()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Registered type ids in sorted order.
    pub fn registered_types(&self) -> impl Iterator<Item = &str> + '_ {
        self.types.keys().map(String::as_str)
    }

    pub fn descriptor(&self, type_id: &str) -> Option<&Arc<PluginTypeDescriptor>> {
        self.types.get(type_id).map(|t| &t.descriptor)
    }

    /// Descriptors in type id order.
    pub fn descriptors(&self) -> impl Iterator<Item = &PluginTypeDescriptor> + '_ {
        self.types.values().map(|t| t.descriptor.as_ref())
    }

    pub fn contains(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Scope;
    use crate::plugins::{MethodTable, PluginHealth};
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo {
        prefix: String,
    }

    #[async_trait]
    impl Plugin for Echo {
        fn capabilities() -> Vec<CapabilitySpec> {
            vec![
                CapabilitySpec::new("echo", "Echo the arguments back"),
                CapabilitySpec::new("reset", "Reset state").method("do_reset").admin(),
            ]
        }

        fn required_config_keys() -> Vec<&'static str> {
            vec!["prefix"]
        }

        fn methods() -> MethodTable<Self> {
            MethodTable::new()
                .method("echo", |p: Arc<Self>, args| async move {
                    Ok(json!({ "prefix": p.prefix, "args": args }))
                })
                .method("do_reset", |_p: Arc<Self>, _args| async move { Ok(json!(true)) })
        }

        fn from_config(_project_id: &ProjectId, config: &PluginConfig) -> Result<Self, PluginError> {
            let prefix = config.require_str("prefix")?;
            if prefix == "explode" {
                return Err(PluginError::InvalidSetting {
                    key: "prefix".into(),
                    reason: "refusing to explode".into(),
                });
            }
            Ok(Self {
                prefix: prefix.to_string(),
            })
        }

        async fn health_check(&self) -> PluginHealth {
            PluginHealth::healthy(format!("{} ok", self.prefix))
        }
    }

    struct Dangling;

    #[async_trait]
    impl Plugin for Dangling {
        fn capabilities() -> Vec<CapabilitySpec> {
            vec![CapabilitySpec::new("ghost", "").method("missing")]
        }

        fn methods() -> MethodTable<Self> {
            MethodTable::new()
        }

        fn from_config(_: &ProjectId, _: &PluginConfig) -> Result<Self, PluginError> {
            Ok(Self)
        }
    }

    struct DoubleDeclared;

    #[async_trait]
    impl Plugin for DoubleDeclared {
        fn capabilities() -> Vec<CapabilitySpec> {
            vec![CapabilitySpec::new("a", ""), CapabilitySpec::new("a", "")]
        }

        fn methods() -> MethodTable<Self> {
            MethodTable::new().method("a", |_p: Arc<Self>, _args| async move { Ok(json!(null)) })
        }

        fn from_config(_: &ProjectId, _: &PluginConfig) -> Result<Self, PluginError> {
            Ok(Self)
        }
    }

    #[test]
    fn test_register_and_describe() {
        let mut registry = PluginRegistry::new();
        let descriptor = registry.register::<Echo>("echo").unwrap();

        assert_eq!(descriptor.type_id, "echo");
        assert_eq!(descriptor.required_config_keys, vec!["prefix".to_string()]);
        assert_eq!(descriptor.capabilities.len(), 2);
        assert_eq!(descriptor.capabilities[1].scope, Scope::Admin);
        assert_eq!(registry.registered_types().collect::<Vec<_>>(), vec!["echo"]);
    }

    #[test]
    fn test_duplicate_type() {
        let mut registry = PluginRegistry::new();
        registry.register::<Echo>("echo").unwrap();
        assert!(matches!(
            registry.register::<Echo>("echo"),
            Err(RegistryError::DuplicateType(t)) if t == "echo"
        ));
    }

    #[test]
    fn test_contract_violations() {
        let mut registry = PluginRegistry::new();
        assert!(matches!(
            registry.register::<Dangling>("dangling"),
            Err(RegistryError::ContractViolation { .. })
        ));
        assert!(matches!(
            registry.register::<DoubleDeclared>("double"),
            Err(RegistryError::ContractViolation { .. })
        ));
        assert!(matches!(
            registry.register::<Echo>("Bad-Type"),
            Err(RegistryError::ContractViolation { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registered_types_sorted() {
        let mut registry = PluginRegistry::new();
        registry.register::<Echo>("zeta").unwrap();
        registry.register::<Echo>("alpha").unwrap();
        let first: Vec<_> = registry.registered_types().collect();
        let second: Vec<_> = registry.registered_types().collect();
        assert_eq!(first, vec!["alpha", "zeta"]);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_create_instance_and_call() {
        let mut registry = PluginRegistry::new();
        registry.register::<Echo>("echo").unwrap();

        let config = PluginConfig::new().with("prefix", "hi");
        let instance = registry
            .create_instance("echo", &ProjectId::new("echo_one"), &config)
            .unwrap();

        let mut args = crate::plugins::Arguments::new();
        args.insert("x".into(), json!(1));
        let result = instance.call("echo", args).await.unwrap();
        assert_eq!(result, json!({ "prefix": "hi", "args": { "x": 1 } }));

        assert!(matches!(
            instance.call("nope", Default::default()).await,
            Err(PluginError::UnknownMethod(_))
        ));
        assert_eq!(instance.health_check().await.message, "hi ok");
    }

    #[test]
    fn test_create_instance_errors() {
        let mut registry = PluginRegistry::new();
        registry.register::<Echo>("echo").unwrap();
        let project = ProjectId::new("echo_one");

        assert!(matches!(
            registry.create_instance("nope", &project, &PluginConfig::new()),
            Err(RegistryError::UnknownType(_))
        ));
        assert!(matches!(
            registry.create_instance("echo", &project, &PluginConfig::new()),
            Err(RegistryError::MissingConfig { missing, .. }) if missing == vec!["prefix".to_string()]
        ));
        assert!(matches!(
            registry.create_instance("echo", &project, &PluginConfig::new().with("prefix", "explode")),
            Err(RegistryError::Construction { .. })
        ));
    }
}
