//! Site field injection for unified tool schemas.

use serde_json::{json, Map, Value};

use crate::plugins::SITE_FIELD;

/// Copy `schema` and add a required `site` string as the first property and
/// the first required entry.
///
/// Top-level keys other than `type`, `properties` and `required` are kept in
/// their original order after those three.
pub fn inject_site_field(schema: &Value, plugin_type: &str) -> Value {
    let empty = Map::new();
    let source = schema.as_object().unwrap_or(&empty);

    let mut properties = Map::new();
    properties.insert(SITE_FIELD.to_string(), site_property(plugin_type));
    if let Some(Value::Object(existing)) = source.get("properties") {
        for (name, property) in existing {
            if name != SITE_FIELD {
                properties.insert(name.clone(), property.clone());
            }
        }
    }

    let mut required = vec![Value::String(SITE_FIELD.to_string())];
    if let Some(Value::Array(existing)) = source.get("required") {
        required.extend(
            existing
                .iter()
                .filter(|r| r.as_str() != Some(SITE_FIELD))
                .cloned(),
        );
    }

    let mut out = Map::new();
    out.insert("type".to_string(), Value::String("object".to_string()));
    out.insert("properties".to_string(), Value::Object(properties));
    out.insert("required".to_string(), Value::Array(required));
    for (key, value) in source {
        if !matches!(key.as_str(), "type" | "properties" | "required") {
            out.insert(key.clone(), value.clone());
        }
    }
    Value::Object(out)
}

fn site_property(plugin_type: &str) -> Value {
    json!({
        "type": "string",
        "description": format!(
            "Target site: a canonical project id (e.g. {pt}_site1) or a configured alias",
            pt = plugin_type
        )
    })
}
