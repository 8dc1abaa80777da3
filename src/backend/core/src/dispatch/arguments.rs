//! Argument normalization applied before a plugin method sees its arguments.

use serde_json::{Map, Value};

use crate::error::HubError;
use crate::plugins::{Arguments, SITE_FIELD};

/// Require the raw call arguments to be a JSON object. `null` counts as `{}`.
pub fn into_object(args: Value) -> Result<Arguments, HubError> {
    match args {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(HubError::invalid_arguments(format!(
            "tool arguments must be a JSON object, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Remove and return the `site` selector.
pub fn take_site(args: &mut Arguments) -> Result<String, HubError> {
    match args.remove(SITE_FIELD) {
        Some(Value::String(site)) if !site.trim().is_empty() => Ok(site.trim().to_string()),
        Some(Value::String(_)) | None | Some(Value::Null) => Err(HubError::invalid_arguments(
            "missing required argument 'site' (a project id or alias)",
        )),
        Some(other) => Err(HubError::invalid_arguments(format!(
            "argument 'site' must be a string, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Drop `null` values and empty strings; replace strings holding a JSON
/// object or array with the parsed value.
///
/// Only top-level values are touched.
pub fn normalize(args: Arguments) -> Arguments {
    args.into_iter()
        .filter_map(|(key, value)| match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some((key, parse_embedded_json(s))),
            other => Some((key, other)),
        })
        .collect()
}

fn parse_embedded_json(s: String) -> Value {
    let trimmed = s.trim();
    let looks_structured = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if !looks_structured {
        return Value::String(s);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(parsed) => parsed,
        Err(_) => Value::String(s),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
