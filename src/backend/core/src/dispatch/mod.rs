//! Per-call dispatch.
//!
//! The [`Dispatcher`] is the single entry point for tool calls. A call flows
//! through:
//!
//! 1. Tool lookup: unified tool table first, then the closed system-tool set
//! 2. Site resolution for unified tools (the `site` argument is consumed)
//! 3. Access policy, with the key's project binding normalized to a canonical id
//! 4. Instance lookup or single-flight construction
//! 5. Argument normalization and the bound plugin method
//!
//! [`Dispatcher::call`] adds key authentication and rate limiting in front,
//! and converts failures into the caller-visible error envelope. Every call
//! that reaches [`Dispatcher::invoke`] leaves an entry in the audit trail.
//!
//! # Example
//!
//! ```rust,ignore
//! let response = dispatcher
//!     .call(&raw_key, "wordpress_list_posts", json!({"site": "mainsite", "per_page": 5}))
//!     .await;
//! ```

pub mod arguments;
pub mod rate_limit;
pub mod stats;
mod system;

pub use rate_limit::{KeyUsage, RateLimitConfig, RateLimitResult, RateLimitStats, RateLimiter};
pub use stats::{format_uptime, HubStats, StatsSnapshot};

use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::access::{AccessPolicy, ApiKeyRecord, ApiKeyStore, CallContext, KeyBinding};
use crate::audit::{AuditEntry, AuditLogger};
use crate::catalog::ProjectCatalog;
use crate::error::{ErrorInfo, ErrorResponse, HubError};
use crate::health::{HealthAggregator, HealthConfig};
use crate::telemetry::{DispatchMetrics, SensitiveFieldRedactor};
use crate::tools::{SystemTool, ToolDefinition, UnifiedTool, UnifiedToolTable};

// ═══════════════════════════════════════════════════════════════════════════════
// Response Envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// What a caller receives for one tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ToolResponse {
    Success { success: bool, result: Value },
    Failure(ErrorResponse),
}

impl ToolResponse {
    pub fn success(result: Value) -> Self {
        Self::Success {
            success: true,
            result,
        }
    }

    pub fn failure(error: &HubError) -> Self {
        Self::Failure(ErrorResponse::from(error))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result, .. } => Some(result),
            Self::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(response) => Some(&response.error),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dispatcher
// ═══════════════════════════════════════════════════════════════════════════════

/// Routes tool calls to system handlers or plugin instances.
///
/// Everything it holds is either immutable after startup or internally
/// synchronized, so a single dispatcher is shared across all concurrent calls.
#[derive(Debug)]
pub struct Dispatcher {
    tools: Arc<UnifiedToolTable>,
    catalog: Arc<ProjectCatalog>,
    keys: Arc<ApiKeyStore>,
    limiter: RateLimiter,
    stats: HubStats,
    health: HealthAggregator,
    audit: Arc<AuditLogger>,
}

impl Dispatcher {
    pub fn new(
        tools: Arc<UnifiedToolTable>,
        catalog: Arc<ProjectCatalog>,
        keys: Arc<ApiKeyStore>,
        rate_limit: RateLimitConfig,
        health: HealthConfig,
        audit: Arc<AuditLogger>,
    ) -> Self {
        info!(
            unified_tools = tools.len(),
            system_tools = SystemTool::ALL.len(),
            projects = catalog.len(),
            rate_limit_enabled = rate_limit.enabled,
            "Dispatcher ready"
        );

        Self {
            health: HealthAggregator::new(Arc::clone(&catalog), health),
            tools,
            catalog,
            keys,
            limiter: RateLimiter::new(rate_limit),
            stats: HubStats::new(),
            audit,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entry Points
    // ─────────────────────────────────────────────────────────────────────────

    /// Authenticate `raw_key`, apply the rate limit, and invoke the tool.
    ///
    /// Never fails: every error is returned as a [`ToolResponse::Failure`].
    pub async fn call(&self, raw_key: &str, tool_name: &str, args: Value) -> ToolResponse {
        match self.authenticated_invoke(raw_key, tool_name, args).await {
            Ok(result) => ToolResponse::success(result),
            Err(error) => {
                error.log();
                ToolResponse::failure(&error)
            }
        }
    }

    async fn authenticated_invoke(&self, raw_key: &str, tool_name: &str, args: Value) -> Result<Value, HubError> {
        let key = self.keys.validate(raw_key).map_err(|e| {
            warn!(tool = %tool_name, error = %e, "API key rejected");
            HubError::from(e)
        })?;

        let limit = self.limiter.check(&key.key_id);
        if !limit.allowed {
            let error = HubError::rate_limited(&key.key_id, limit.retry_after_secs.unwrap_or(60));
            self.audit
                .record(AuditEntry::tool_call(tool_name, &key.key_id, Err(&error), Duration::ZERO));
            return Err(error);
        }

        self.invoke(tool_name, args, &key).await
    }

    /// Invoke `tool_name` on behalf of an already-authenticated key.
    ///
    /// # Errors
    ///
    /// `UnknownTool`, `InvalidArguments`, `UnknownSite`, `Authorization`,
    /// `Configuration` or `Upstream`; each affects this call only.
    pub async fn invoke(&self, tool_name: &str, args: Value, key: &ApiKeyRecord) -> Result<Value, HubError> {
        let start = Instant::now();
        let key = self.normalize_binding(key);
        let site = args.get("site").and_then(Value::as_str).map(str::to_string);
        let audited_args = self.audit.is_enabled().then(|| args.clone());

        let (tool_label, plugin_type, result) = if let Some(tool) = self.tools.get(tool_name) {
            (tool_name, tool.plugin_type.as_str(), self.invoke_unified(tool, args, &key).await)
        } else if let Some(system) = SystemTool::from_name(tool_name) {
            (tool_name, "system", self.invoke_system(system, args, &key).await)
        } else {
            ("unknown", "unknown", Err(HubError::unknown_tool(tool_name)))
        };

        let elapsed = start.elapsed();
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        self.stats.record_call(tool_label, result.is_ok(), elapsed);
        DispatchMetrics::record_tool_call(tool_label, plugin_type, outcome, elapsed);

        match &result {
            Ok(_) => info!(
                tool = %tool_name,
                key_id = %key.key_id,
                duration_ms = elapsed.as_millis() as u64,
                outcome,
                "Tool call completed"
            ),
            Err(e) => warn!(
                tool = %tool_name,
                key_id = %key.key_id,
                duration_ms = elapsed.as_millis() as u64,
                outcome,
                error = %e.user_message(),
                "Tool call failed"
            ),
        }

        if let Some(audited_args) = audited_args {
            let project_id = match (self.tools.get(tool_name), site.as_deref()) {
                (Some(tool), Some(site)) => self
                    .catalog
                    .resolve_for_type(&tool.plugin_type, site)
                    .ok()
                    .map(|id| id.as_str().to_string()),
                _ => None,
            };
            self.audit.record(
                AuditEntry::tool_call(tool_name, &key.key_id, result.as_ref().map(|_| ()), elapsed)
                    .with_site(site)
                    .with_project(project_id)
                    .with_params(&audited_args),
            );
        }
        result
    }

    /// Tools `key` is allowed to call, in name order: unified tools first,
    /// then system tools.
    ///
    /// Project-bound keys see only the tools of their project's plugin type
    /// and never see system tools.
    pub fn visible_tools(&self, key: &ApiKeyRecord) -> Vec<ToolDefinition> {
        if !key.is_active() {
            return Vec::new();
        }
        let key = self.normalize_binding(key);

        match &key.binding {
            KeyBinding::Global => self
                .tools
                .iter()
                .filter(|tool| key.scope.satisfies(tool.scope))
                .map(|tool| ToolDefinition::from(tool.as_ref()))
                .chain(
                    SystemTool::ALL
                        .into_iter()
                        .filter(|tool| key.scope.satisfies(tool.scope()))
                        .map(ToolDefinition::from),
                )
                .collect(),
            KeyBinding::Project(project_id) => {
                let Some(project) = self.catalog.project(project_id) else {
                    return Vec::new();
                };
                self.tools
                    .for_plugin_type(&project.plugin_type)
                    .filter(|tool| key.scope.satisfies(tool.scope))
                    .map(|tool| ToolDefinition::from(tool.as_ref()))
                    .collect()
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Routing
    // ─────────────────────────────────────────────────────────────────────────

    async fn invoke_unified(&self, tool: &UnifiedTool, args: Value, key: &ApiKeyRecord) -> Result<Value, HubError> {
        let mut args = arguments::into_object(args)?;
        let site = arguments::take_site(&mut args)?;
        let project_id = self.catalog.resolve_for_type(&tool.plugin_type, &site)?;

        self.authorize(&CallContext::unified(key, &tool.name, tool.scope, &project_id))?;

        let instance = self.catalog.get_or_create_instance(&project_id).await?;
        let args = arguments::normalize(args);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let logged = SensitiveFieldRedactor::global().redact_json(&Value::Object(args.clone()));
            debug!(
                tool = %tool.name,
                project_id = %project_id,
                method = %tool.method_name,
                arguments = %logged,
                "Invoking plugin method"
            );
        }

        instance
            .call(&tool.method_name, args)
            .await
            .map_err(|e| HubError::upstream(&tool.plugin_type, project_id.as_str(), &e).with_source(e))
    }

    async fn invoke_system(&self, tool: SystemTool, args: Value, key: &ApiKeyRecord) -> Result<Value, HubError> {
        let args = arguments::into_object(args)?;
        self.authorize(&CallContext::system(key, tool))?;
        self.run_system_tool(tool, arguments::normalize(args)).await
    }

    fn authorize(&self, ctx: &CallContext<'_>) -> Result<(), HubError> {
        AccessPolicy::enforce(ctx).map_err(|e| {
            let reason = e
                .details()
                .context
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("denied");
            DispatchMetrics::record_access_denied(ctx.tool_name, reason);
            warn!(
                tool = %ctx.tool_name,
                key_id = %ctx.key.key_id,
                target_project = ?ctx.target_project.map(|p| p.as_str()),
                reason = %e.user_message(),
                "Access denied"
            );
            e
        })
    }

    /// Rewrite a project binding given as an alias to the canonical id.
    fn normalize_binding<'a>(&self, key: &'a ApiKeyRecord) -> Cow<'a, ApiKeyRecord> {
        let KeyBinding::Project(bound) = &key.binding else {
            return Cow::Borrowed(key);
        };
        match self.catalog.resolve_reference(bound.as_str()) {
            Ok(canonical) if &canonical != bound => {
                debug!(key_id = %key.key_id, alias = %bound, project_id = %canonical, "Normalized key binding");
                let mut normalized = key.clone();
                normalized.binding = KeyBinding::Project(canonical);
                Cow::Owned(normalized)
            }
            _ => Cow::Borrowed(key),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn tools(&self) -> &UnifiedToolTable {
        &self.tools
    }

    pub fn catalog(&self) -> &Arc<ProjectCatalog> {
        &self.catalog
    }

    pub fn key_store(&self) -> &Arc<ApiKeyStore> {
        &self.keys
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn stats(&self) -> &HubStats {
        &self.stats
    }

    pub fn health(&self) -> &HealthAggregator {
        &self.health
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }
}
