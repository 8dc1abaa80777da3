//! Cross-project system tools.
//!
//! The set is closed: a name is a system tool only if it matches one of
//! these exactly.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

use crate::access::Scope;

/// Administrative tool that is never bound to a single project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemTool {
    ListProjects,
    GetProjectInfo,
    CheckAllProjectsHealth,
    GetProjectHealth,
    GetSystemMetrics,
    GetSystemUptime,
    GetRateLimitStats,
    ManageApiKeysList,
    ManageApiKeysGetInfo,
    ManageApiKeysCreate,
    ManageApiKeysRevoke,
    ManageApiKeysRotate,
}

impl SystemTool {
    pub const ALL: [SystemTool; 12] = [
        Self::ListProjects,
        Self::GetProjectInfo,
        Self::CheckAllProjectsHealth,
        Self::GetProjectHealth,
        Self::GetSystemMetrics,
        Self::GetSystemUptime,
        Self::GetRateLimitStats,
        Self::ManageApiKeysList,
        Self::ManageApiKeysGetInfo,
        Self::ManageApiKeysCreate,
        Self::ManageApiKeysRevoke,
        Self::ManageApiKeysRotate,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::ListProjects => "list_projects",
            Self::GetProjectInfo => "get_project_info",
            Self::CheckAllProjectsHealth => "check_all_projects_health",
            Self::GetProjectHealth => "get_project_health",
            Self::GetSystemMetrics => "get_system_metrics",
            Self::GetSystemUptime => "get_system_uptime",
            Self::GetRateLimitStats => "get_rate_limit_stats",
            Self::ManageApiKeysList => "manage_api_keys_list",
            Self::ManageApiKeysGetInfo => "manage_api_keys_get_info",
            Self::ManageApiKeysCreate => "manage_api_keys_create",
            Self::ManageApiKeysRevoke => "manage_api_keys_revoke",
            Self::ManageApiKeysRotate => "manage_api_keys_rotate",
        }
    }

    /// Exact-match lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tool| tool.name() == name)
    }

    /// Minimum scope required to call the tool.
    pub const fn scope(&self) -> Scope {
        match self {
            Self::ManageApiKeysList
            | Self::ManageApiKeysGetInfo
            | Self::ManageApiKeysCreate
            | Self::ManageApiKeysRevoke
            | Self::ManageApiKeysRotate => Scope::Admin,
            _ => Scope::Read,
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::ListProjects => "List every configured project with its plugin type and aliases",
            Self::GetProjectInfo => "Show configuration details for one project",
            Self::CheckAllProjectsHealth => "Run health checks against every configured project",
            Self::GetProjectHealth => "Run the health check of one project",
            Self::GetSystemMetrics => "Report call counts, error rate and response times",
            Self::GetSystemUptime => "Report process uptime",
            Self::GetRateLimitStats => "Report per-key rate limit usage",
            Self::ManageApiKeysList => "List API keys, optionally filtered by project",
            Self::ManageApiKeysGetInfo => "Show one API key's metadata",
            Self::ManageApiKeysCreate => "Create an API key; the raw key is returned once",
            Self::ManageApiKeysRevoke => "Revoke an API key",
            Self::ManageApiKeysRotate => "Replace every active key of a project with a new one",
        }
    }

    pub fn input_schema(&self) -> Value {
        match self {
            Self::ListProjects
            | Self::CheckAllProjectsHealth
            | Self::GetSystemMetrics
            | Self::GetSystemUptime
            | Self::GetRateLimitStats => json!({ "type": "object", "properties": {} }),

            Self::GetProjectInfo | Self::GetProjectHealth | Self::ManageApiKeysRotate => json!({
                "type": "object",
                "properties": {
                    "project_id": {
                        "type": "string",
                        "description": "Canonical project id or configured alias"
                    }
                },
                "required": ["project_id"]
            }),

            Self::ManageApiKeysList => json!({
                "type": "object",
                "properties": {
                    "project_id": {
                        "type": "string",
                        "description": "Only keys bound to this project ('*' for global keys)"
                    },
                    "include_revoked": { "type": "boolean", "default": false }
                }
            }),

            Self::ManageApiKeysGetInfo | Self::ManageApiKeysRevoke => json!({
                "type": "object",
                "properties": {
                    "key_id": { "type": "string" }
                },
                "required": ["key_id"]
            }),

            Self::ManageApiKeysCreate => json!({
                "type": "object",
                "properties": {
                    "project_id": {
                        "type": "string",
                        "description": "Project the key is bound to, or '*' for a global key"
                    },
                    "scope": {
                        "type": "string",
                        "enum": ["read", "write", "admin"]
                    },
                    "description": { "type": "string" },
                    "expires_in_days": { "type": "integer", "minimum": 1 }
                },
                "required": ["project_id", "scope"]
            }),
        }
    }
}

impl fmt::Display for SystemTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
