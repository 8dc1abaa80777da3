//! Handlers for the cross-project system tools.

use serde_json::{json, Value};

use super::Dispatcher;
use crate::access::{ApiKeyRecord, GeneratedKey, KeyBinding, ProjectId, Scope, GLOBAL_BINDING};
use crate::catalog::{CatalogError, ProjectConfig};
use crate::error::HubError;
use crate::plugins::{Arguments, ArgumentsExt};
use crate::tools::SystemTool;

impl Dispatcher {
    pub(super) async fn run_system_tool(&self, tool: SystemTool, args: Arguments) -> Result<Value, HubError> {
        match tool {
            SystemTool::ListProjects => Ok(self.list_projects()),
            SystemTool::GetProjectInfo => {
                let project_id = self.catalog.resolve_reference(required(&args, "project_id")?)?;
                Ok(self.project_info(&project_id))
            }
            SystemTool::CheckAllProjectsHealth => Ok(serde_json::to_value(self.health.check_all().await)?),
            SystemTool::GetProjectHealth => {
                let health = self.health.check_project(required(&args, "project_id")?).await?;
                Ok(serde_json::to_value(health)?)
            }
            SystemTool::GetSystemMetrics => Ok(self.system_metrics()?),
            SystemTool::GetSystemUptime => Ok(self.system_uptime()),
            SystemTool::GetRateLimitStats => Ok(serde_json::to_value(self.limiter.stats())?),
            SystemTool::ManageApiKeysList => self.list_keys(&args),
            SystemTool::ManageApiKeysGetInfo => {
                let record = self.keys.get_key_info(required(&args, "key_id")?)?;
                Ok(json!({ "key": record }))
            }
            SystemTool::ManageApiKeysCreate => self.create_key(&args),
            SystemTool::ManageApiKeysRevoke => {
                let record = self.keys.revoke(required(&args, "key_id")?)?;
                self.limiter.reset(&record.key_id);
                Ok(json!({
                    "message": format!("API key {} revoked", record.key_id),
                    "key": record,
                }))
            }
            SystemTool::ManageApiKeysRotate => self.rotate_keys(&args),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────────────────────────

    fn list_projects(&self) -> Value {
        let projects: Vec<Value> = self
            .catalog
            .projects()
            .map(|project| self.project_summary(project))
            .collect();
        json!({ "total": projects.len(), "projects": projects })
    }

    fn project_summary(&self, project: &ProjectConfig) -> Value {
        json!({
            "project_id": project.id,
            "plugin_type": project.plugin_type,
            "site_id": project.site_id,
            "aliases": self.catalog.aliases_of(&project.id),
            "instance_cached": self.catalog.is_cached(&project.id),
        })
    }

    /// Project details. Setting values are never returned, only their keys.
    fn project_info(&self, project_id: &ProjectId) -> Value {
        let Some(project) = self.catalog.project(project_id) else {
            return Value::Null;
        };

        let mut info = self.project_summary(project);
        let tools: Vec<&str> = self
            .tools
            .for_plugin_type(&project.plugin_type)
            .map(|tool| tool.name.as_str())
            .collect();
        if let Value::Object(map) = &mut info {
            map.insert("settings".to_string(), json!(project.settings.keys().collect::<Vec<_>>()));
            map.insert("tools".to_string(), json!(tools));
        }
        info
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn system_metrics(&self) -> Result<Value, HubError> {
        let mut metrics = serde_json::to_value(self.stats.snapshot())?;
        if let Value::Object(map) = &mut metrics {
            map.insert("projects".to_string(), json!(self.catalog.len()));
            map.insert(
                "cached_instances".to_string(),
                json!(self.catalog.instances().cached_projects().len()),
            );
            map.insert("unified_tools".to_string(), json!(self.tools.len()));
        }
        Ok(metrics)
    }

    fn system_uptime(&self) -> Value {
        let secs = self.stats.uptime().as_secs();
        json!({
            "started_at": self.stats.started_at(),
            "uptime_seconds": secs,
            "uptime_minutes": secs / 60,
            "uptime_hours": secs / 3_600,
            "uptime_days": secs / 86_400,
            "uptime": super::format_uptime(self.stats.uptime()),
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API Keys
    // ─────────────────────────────────────────────────────────────────────────

    fn list_keys(&self, args: &Arguments) -> Result<Value, HubError> {
        let binding = args.optional_str("project_id").map(|p| self.binding_for(p, false)).transpose()?;
        let include_revoked = args.optional_bool("include_revoked").unwrap_or(false);

        let keys = self.keys.list_keys(binding.as_ref(), include_revoked);
        Ok(json!({ "total": keys.len(), "keys": keys }))
    }

    fn create_key(&self, args: &Arguments) -> Result<Value, HubError> {
        let binding = self.binding_for(required(args, "project_id")?, true)?;
        let scope: Scope = required(args, "scope")?
            .parse()
            .map_err(|e: crate::access::ParseScopeError| HubError::invalid_arguments(e.to_string()))?;
        let description = args.optional_str("description").map(str::to_string);
        let expires_in = match args.get("expires_in_days") {
            None => None,
            Some(value) => match value.as_i64() {
                Some(days) if days > 0 => Some(chrono::Duration::days(days)),
                _ => {
                    return Err(HubError::invalid_arguments(
                        "'expires_in_days' must be a positive integer",
                    ))
                }
            },
        };

        let generated = self.keys.create_key(binding, scope, description, expires_in)?;
        Ok(json!({
            "message": "API key created",
            "warning": "Save this key now; it cannot be shown again",
            "key": generated.raw_key,
            "key_id": generated.record.key_id,
            "project_id": generated.record.binding,
            "scope": generated.record.scope,
            "expires_at": generated.record.expires_at,
            "created_at": generated.record.created_at,
        }))
    }

    fn rotate_keys(&self, args: &Arguments) -> Result<Value, HubError> {
        let project_id = match self.binding_for(required(args, "project_id")?, false)? {
            KeyBinding::Project(id) => id,
            KeyBinding::Global => {
                return Err(HubError::invalid_arguments(
                    "rotation applies to project keys; pass a project id, not '*'",
                ))
            }
        };

        let rotated = self.keys.rotate_project_keys(&project_id)?;
        let new_keys: Vec<Value> = rotated.iter().map(issued_key).collect();
        Ok(json!({
            "message": format!("Rotated {} keys for project {}", rotated.len(), project_id),
            "warning": "Save these keys now; they cannot be shown again",
            "rotated_count": rotated.len(),
            "new_keys": new_keys,
        }))
    }

    /// `*` is global; anything else names a project the way a unified
    /// tool's `site` argument does, across all plugin types.
    ///
    /// With `strict`, the project must be configured. Otherwise an unknown
    /// reference is used verbatim so keys of removed projects stay manageable.
    fn binding_for(&self, reference: &str, strict: bool) -> Result<KeyBinding, HubError> {
        let reference = reference.trim();
        if reference == GLOBAL_BINDING {
            return Ok(KeyBinding::Global);
        }
        match self.catalog.resolve_reference(reference) {
            Ok(id) => Ok(KeyBinding::Project(id)),
            Err(e @ CatalogError::AmbiguousSite { .. }) => Err(e.into()),
            Err(e) if strict => Err(e.into()),
            Err(_) => Ok(KeyBinding::Project(ProjectId::new(reference))),
        }
    }
}

fn required<'a>(args: &'a Arguments, name: &str) -> Result<&'a str, HubError> {
    args.required_str(name)
        .map_err(|e| HubError::invalid_arguments(e.to_string()))
}

fn issued_key(generated: &GeneratedKey) -> Value {
    let record: &ApiKeyRecord = &generated.record;
    json!({
        "key": generated.raw_key,
        "key_id": record.key_id,
        "scope": record.scope,
        "description": record.description,
    })
}
