//! Access data models: scopes, project identifiers, key bindings and key records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::tools::SystemTool;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed project identifier (conventionally `{plugin_type}_{site_id}`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Build the conventional id for a site of a plugin type.
    pub fn for_site(plugin_type: &str, site_id: &str) -> Self {
        Self(format!("{}_{}", plugin_type, site_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::borrow::Borrow<str> for ProjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Scope
// ═══════════════════════════════════════════════════════════════════════════════

/// Privilege level required by a capability and held by a key.
///
/// Totally ordered: `Read < Write < Admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Read,
    Write,
    Admin,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Read, Scope::Write, Scope::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    /// Whether a key holding `self` may invoke something requiring `required`.
    pub fn satisfies(&self, required: Scope) -> bool {
        *self >= required
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::Read
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown scope string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scope '{0}' (expected read, write or admin)")]
pub struct ParseScopeError(pub String);

impl FromStr for Scope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            other => Err(ParseScopeError(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Key Binding
// ═══════════════════════════════════════════════════════════════════════════════

/// Sentinel used in storage and on the wire for a global binding.
pub const GLOBAL_BINDING: &str = "*";

/// What a key is allowed to target: every project, or exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KeyBinding {
    Global,
    Project(ProjectId),
}

impl KeyBinding {
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    pub fn project(&self) -> Option<&ProjectId> {
        match self {
            Self::Global => None,
            Self::Project(id) => Some(id),
        }
    }
}

impl From<String> for KeyBinding {
    fn from(s: String) -> Self {
        if s == GLOBAL_BINDING {
            Self::Global
        } else {
            Self::Project(ProjectId(s))
        }
    }
}

impl From<&str> for KeyBinding {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<KeyBinding> for String {
    fn from(binding: KeyBinding) -> Self {
        match binding {
            KeyBinding::Global => GLOBAL_BINDING.to_string(),
            KeyBinding::Project(id) => id.0,
        }
    }
}

impl fmt::Display for KeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str(GLOBAL_BINDING),
            Self::Project(id) => write!(f, "{}", id),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Key Record
// ═══════════════════════════════════════════════════════════════════════════════

/// A resolved API key, as presented to the access policy.
///
/// The raw token never appears here; only the store knows its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_id: String,
    /// Maximum scope the key may invoke.
    pub scope: Scope,
    #[serde(rename = "project_id")]
    pub binding: KeyBinding,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_count: u64,
}

impl ApiKeyRecord {
    pub fn new(key_id: impl Into<String>, binding: KeyBinding, scope: Scope) -> Self {
        Self {
            key_id: key_id.into(),
            scope,
            binding,
            revoked: false,
            description: None,
            created_at: Utc::now(),
            expires_at: None,
            last_used_at: None,
            usage_count: 0,
        }
    }

    pub fn global(key_id: impl Into<String>, scope: Scope) -> Self {
        Self::new(key_id, KeyBinding::Global, scope)
    }

    pub fn for_project(key_id: impl Into<String>, project: impl Into<ProjectId>, scope: Scope) -> Self {
        Self::new(key_id, KeyBinding::Project(project.into()), scope)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_global(&self) -> bool {
        self.binding.is_global()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| Utc::now() > exp).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        !self.revoked && !self.is_expired()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Call Context
// ═══════════════════════════════════════════════════════════════════════════════

/// The kind of tool being requested, as far as access control is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// Cross-project administrative tool.
    System(SystemTool),
    /// Per-project tool with the scope its capability requires.
    Unified { scope: Scope },
    /// Name found in neither table. Evaluated like a unified tool requiring
    /// the highest scope.
    Unrecognized,
}

/// Everything the access policy needs to decide one call.
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    pub key: &'a ApiKeyRecord,
    pub tool_name: &'a str,
    pub tool: ToolKind,
    /// Resolved target project; `None` for system tools.
    pub target_project: Option<&'a ProjectId>,
}

impl<'a> CallContext<'a> {
    pub fn system(key: &'a ApiKeyRecord, tool: SystemTool) -> Self {
        Self {
            key,
            tool_name: tool.name(),
            tool: ToolKind::System(tool),
            target_project: None,
        }
    }

    pub fn unified(
        key: &'a ApiKeyRecord,
        tool_name: &'a str,
        scope: Scope,
        target_project: &'a ProjectId,
    ) -> Self {
        Self {
            key,
            tool_name,
            tool: ToolKind::Unified { scope },
            target_project: Some(target_project),
        }
    }

    pub fn unrecognized(
        key: &'a ApiKeyRecord,
        tool_name: &'a str,
        target_project: Option<&'a ProjectId>,
    ) -> Self {
        Self {
            key,
            tool_name,
            tool: ToolKind::Unrecognized,
            target_project,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_total_order() {
        assert!(Scope::Read < Scope::Write);
        assert!(Scope::Write < Scope::Admin);
        assert!(Scope::Admin.satisfies(Scope::Read));
        assert!(Scope::Write.satisfies(Scope::Write));
        assert!(!Scope::Read.satisfies(Scope::Write));
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("READ".parse::<Scope>().unwrap(), Scope::Read);
        assert_eq!(" admin ".parse::<Scope>().unwrap(), Scope::Admin);
        assert!("owner".parse::<Scope>().is_err());
    }

    #[test]
    fn test_binding_string_round_trip() {
        assert_eq!(KeyBinding::from("*"), KeyBinding::Global);
        assert_eq!(
            KeyBinding::from("wordpress_site1"),
            KeyBinding::Project(ProjectId::new("wordpress_site1"))
        );
        assert_eq!(String::from(KeyBinding::Global), "*");
    }

    #[test]
    fn test_record_serializes_binding_as_project_id() {
        let record = ApiKeyRecord::for_project("key_1", "gitea_main", Scope::Write);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["project_id"], "gitea_main");
        assert_eq!(json["scope"], "write");

        let global = ApiKeyRecord::global("key_2", Scope::Admin);
        let json = serde_json::to_value(&global).unwrap();
        assert_eq!(json["project_id"], "*");
    }

    #[test]
    fn test_expired_record_is_inactive() {
        let record = ApiKeyRecord::global("key_1", Scope::Read)
            .with_expiry(Utc::now() - chrono::Duration::minutes(1));
        assert!(record.is_expired());
        assert!(!record.is_active());
    }

    #[test]
    fn test_project_id_for_site() {
        assert_eq!(
            ProjectId::for_site("wordpress", "site4").as_str(),
            "wordpress_site4"
        );
    }
}
