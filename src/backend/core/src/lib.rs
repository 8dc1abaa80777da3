#![allow(clippy::result_large_err)]
//! # ToolHub Core
//!
//! Unified tool generation and multi-tenant dispatch for plugin-backed tool hubs.
//!
//! ## Architecture
//!
//! - **Plugins**: backend integrations behind the [`plugins::Plugin`] trait, registered by type id
//! - **Tools**: one `{plugin_type}_{capability}` tool per declared capability plus the system tools
//! - **Catalog**: configured projects, alias resolution and the single-flight instance cache
//! - **Access**: API keys (global or project-bound, scoped) and the pure access policy
//! - **Dispatch**: per-call routing, argument normalization, rate limiting and call statistics
//! - **Audit**: bounded, queryable trail of authentications and tool calls with redacted arguments
//! - **Health**: per-project plugin health checks aggregated into one report
//! - **Telemetry**: structured logging with secret redaction and Prometheus metrics
//! - **Config**: layered TOML + environment configuration

pub mod access;
pub mod audit;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod hub;
pub mod plugins;
pub mod telemetry;
pub mod tools;

pub use error::{ErrorCode, ErrorDetails, ErrorResponse, ErrorSeverity, HubError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::access::{
        AccessDecision, AccessPolicy, ApiKeyRecord, ApiKeyStore, CallContext, DenyReason, GeneratedKey,
        KeyBinding, ProjectId, Scope,
    };
    pub use crate::audit::{AuditEntry, AuditEventType, AuditLogger, AuditQuery};
    pub use crate::catalog::{ProjectCatalog, ProjectConfig};
    pub use crate::config::HubConfig;
    pub use crate::dispatch::{Dispatcher, ToolResponse};
    pub use crate::error::{ErrorCode, HubError, Result};
    pub use crate::health::{HealthReport, HealthStatus, ProjectHealth};
    pub use crate::hub::HubBuilder;
    pub use crate::plugins::{
        Arguments, ArgumentsExt, CapabilitySpec, MethodTable, Plugin, PluginConfig, PluginError, PluginHealth,
        PluginInstance, PluginRegistry,
    };
    pub use crate::tools::{SystemTool, ToolDefinition, UnifiedTool, UnifiedToolTable};
}
