//! Unified tool generation.
//!
//! One unified tool is synthesized per declared capability of every plugin
//! type, named `{plugin_type}_{capability}`, regardless of how many projects
//! of that type exist. The target project is chosen per call through the
//! injected `site` argument.
//!
//! The table is built once at startup and never mutated.

pub mod schema;
pub mod system;

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::access::Scope;
use crate::plugins::PluginRegistry;

pub use schema::inject_site_field;
pub use system::SystemTool;

// ═══════════════════════════════════════════════════════════════════════════════
// Unified Tool
// ═══════════════════════════════════════════════════════════════════════════════

/// A callable tool bound to (plugin type, method).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedTool {
    pub name: String,
    pub plugin_type: String,
    pub capability: String,
    pub method_name: String,
    pub description: String,
    pub scope: Scope,
    /// Capability schema with the required `site` field injected.
    pub input_schema: Value,
}

/// Public shape of a tool as listed to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub scope: Scope,
    pub input_schema: Value,
}

impl From<&UnifiedTool> for ToolDefinition {
    fn from(tool: &UnifiedTool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            scope: tool.scope,
            input_schema: tool.input_schema.clone(),
        }
    }
}

impl From<SystemTool> for ToolDefinition {
    fn from(tool: SystemTool) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            scope: tool.scope(),
            input_schema: tool.input_schema(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error)]
pub enum ToolGenerationError {
    #[error("tool name '{tool_name}' is produced by both {first} and {second}")]
    NameCollision {
        tool_name: String,
        first: String,
        second: String,
    },
}

impl ToolGenerationError {
    pub fn tool_name(&self) -> &str {
        match self {
            Self::NameCollision { tool_name, .. } => tool_name,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Unified Tool Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable tool name → unified tool map.
#[derive(Debug, Clone, Default)]
pub struct UnifiedToolTable {
    tools: BTreeMap<String, Arc<UnifiedTool>>,
}

impl UnifiedToolTable {
    /// Build the table from every registered plugin type.
    ///
    /// Fails if two capabilities map to the same name, or if a generated name
    /// shadows a system tool.
    pub fn generate(registry: &PluginRegistry) -> Result<Self, ToolGenerationError> {
        let mut tools: BTreeMap<String, Arc<UnifiedTool>> = BTreeMap::new();

        for descriptor in registry.descriptors() {
            for capability in &descriptor.capabilities {
                let name = format!("{}_{}", descriptor.type_id, capability.name);
                let origin = format!("{}.{}", descriptor.type_id, capability.name);

                if let Some(system) = SystemTool::from_name(&name) {
                    return Err(ToolGenerationError::NameCollision {
                        tool_name: name,
                        first: format!("system tool '{}'", system),
                        second: origin,
                    });
                }
                if let Some(existing) = tools.get(&name) {
                    return Err(ToolGenerationError::NameCollision {
                        tool_name: name,
                        first: format!("{}.{}", existing.plugin_type, existing.capability),
                        second: origin,
                    });
                }

                let tool = UnifiedTool {
                    input_schema: inject_site_field(&capability.input_schema, &descriptor.type_id),
                    name: name.clone(),
                    plugin_type: descriptor.type_id.clone(),
                    capability: capability.name.clone(),
                    method_name: capability.method_name.clone(),
                    description: capability.description.clone(),
                    scope: capability.scope,
                };
                tools.insert(name, Arc::new(tool));
            }
        }

        info!(
            tools = tools.len(),
            plugin_types = registry.len(),
            "Unified tool table generated"
        );
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&Arc<UnifiedTool>> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<UnifiedTool>> + '_ {
        self.tools.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.tools.keys().map(String::as_str)
    }

    pub fn for_plugin_type<'a>(&'a self, plugin_type: &'a str) -> impl Iterator<Item = &'a Arc<UnifiedTool>> + 'a {
        self.tools.values().filter(move |tool| tool.plugin_type == plugin_type)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
