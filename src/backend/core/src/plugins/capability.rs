//! Capability declarations and their validation.
//!
//! A capability is a site-agnostic operation a plugin type offers. It names
//! the method that serves it, describes its input with a JSON object schema,
//! and states the minimum [`Scope`] a key needs to call it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::access::Scope;

/// Argument name reserved for site selection on unified tools.
pub const SITE_FIELD: &str = "site";

// ═══════════════════════════════════════════════════════════════════════════════
// CapabilitySpec
// ═══════════════════════════════════════════════════════════════════════════════

/// One declared capability of a plugin type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    /// Unique within the plugin type (e.g. `list_posts`).
    pub name: String,

    /// Entry in the plugin's method table that serves this capability.
    pub method_name: String,

    /// Human-readable description surfaced on the unified tool.
    #[serde(default)]
    pub description: String,

    /// JSON object schema of the arguments, without a `site` property.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,

    /// Minimum scope required to call it.
    #[serde(default)]
    pub scope: Scope,
}

impl CapabilitySpec {
    /// A read-scoped capability served by the method of the same name,
    /// taking no arguments.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            method_name: name.clone(),
            name,
            description: description.into(),
            input_schema: empty_object_schema(),
            scope: Scope::Read,
        }
    }

    pub fn method(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = method_name.into();
        self
    }

    pub fn schema(mut self, input_schema: Value) -> Self {
        self.input_schema = input_schema;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn write(self) -> Self {
        self.scope(Scope::Write)
    }

    pub fn admin(self) -> Self {
        self.scope(Scope::Admin)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Check naming and schema rules.
    pub fn validate(&self) -> Result<(), CapabilityError> {
        if !is_identifier(&self.name) {
            return Err(CapabilityError::InvalidName(self.name.clone()));
        }

        if self.method_name.trim().is_empty() {
            return Err(CapabilityError::EmptyMethodName {
                capability: self.name.clone(),
            });
        }

        let schema = self
            .input_schema
            .as_object()
            .ok_or_else(|| self.schema_error("schema must be a JSON object"))?;

        match schema.get("type") {
            None => {}
            Some(Value::String(t)) if t == "object" => {}
            Some(_) => return Err(self.schema_error("schema type must be \"object\"")),
        }

        if let Some(properties) = schema.get("properties") {
            let properties = properties
                .as_object()
                .ok_or_else(|| self.schema_error("properties must be an object"))?;
            if properties.contains_key(SITE_FIELD) {
                return Err(CapabilityError::ReservedField {
                    capability: self.name.clone(),
                });
            }
        }

        if let Some(required) = schema.get("required") {
            let required = required
                .as_array()
                .ok_or_else(|| self.schema_error("required must be an array"))?;
            if required.iter().any(|r| r.as_str() == Some(SITE_FIELD)) {
                return Err(CapabilityError::ReservedField {
                    capability: self.name.clone(),
                });
            }
        }

        Ok(())
    }

    fn schema_error(&self, reason: &str) -> CapabilityError {
        CapabilityError::InvalidSchema {
            capability: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// `{"type": "object", "properties": {}}`
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Lowercase ASCII identifier: starts with a letter, then letters, digits or `_`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CapabilityError {
    #[error("capability name '{0}' must be a lowercase identifier")]
    InvalidName(String),

    #[error("capability '{capability}' has an empty method name")]
    EmptyMethodName { capability: String },

    #[error("capability '{capability}' has an invalid input schema: {reason}")]
    InvalidSchema { capability: String, reason: String },

    #[error("capability '{capability}' declares the reserved 'site' argument")]
    ReservedField { capability: String },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cap = CapabilitySpec::new("list_posts", "List posts");
        assert_eq!(cap.method_name, "list_posts");
        assert_eq!(cap.scope, Scope::Read);
        assert!(cap.validate().is_ok());

        let cap = cap.method("get_posts").write();
        assert_eq!(cap.method_name, "get_posts");
        assert_eq!(cap.scope, Scope::Write);
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("list_posts"));
        assert!(is_identifier("v2"));
        assert!(!is_identifier("ListPosts"));
        assert!(!is_identifier("_private"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_site_property_rejected() {
        let cap = CapabilitySpec::new("list_posts", "").schema(json!({
            "type": "object",
            "properties": { "site": { "type": "string" } }
        }));
        assert_eq!(
            cap.validate(),
            Err(CapabilityError::ReservedField {
                capability: "list_posts".into()
            })
        );
    }

    #[test]
    fn test_non_object_schema_rejected() {
        let cap = CapabilitySpec::new("list_posts", "").schema(json!(["nope"]));
        assert!(matches!(
            cap.validate(),
            Err(CapabilityError::InvalidSchema { .. })
        ));

        let cap = CapabilitySpec::new("list_posts", "").schema(json!({ "type": "array" }));
        assert!(cap.validate().is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let cap: CapabilitySpec = serde_json::from_value(json!({
            "name": "get_stats",
            "method_name": "stats"
        }))
        .unwrap();
        assert_eq!(cap.scope, Scope::Read);
        assert_eq!(cap.input_schema, empty_object_schema());
    }
}
