//! Structured logging with JSON/pretty/compact formats and secret redaction.
//!
//! This module provides:
//!
//! - JSON format for machine consumption, pretty and compact for terminals
//! - Per-module log level configuration on top of `RUST_LOG`
//! - Redaction of hub API keys, bearer tokens, passwords and secrets before
//!   tool arguments reach a log line

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Global redactor instance, set by [`init_logging`].
static REDACTOR: OnceLock<SensitiveFieldRedactor> = OnceLock::new();

/// Logging configuration (`[logging]`).
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Per-module log levels, e.g. `toolhub_core::catalog = "debug"`
    #[serde(default)]
    pub module_levels: HashMap<String, String>,

    /// Whether to include file/line information
    #[serde(default)]
    pub include_location: bool,

    /// Whether to include target (module path)
    #[serde(default = "default_include_target")]
    pub include_target: bool,

    #[serde(default)]
    pub redaction: RedactionConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            module_levels: HashMap::new(),
            include_location: false,
            include_target: default_include_target(),
            redaction: RedactionConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    /// Single-line format
    #[default]
    Compact,
}

/// Configuration for sensitive data redaction.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionConfig {
    #[serde(default = "default_redaction_enabled")]
    pub enabled: bool,

    #[serde(default = "default_redaction_patterns")]
    pub patterns: Vec<RedactionPattern>,

    /// Replacement text for redacted values
    #[serde(default = "default_redaction_replacement")]
    pub replacement: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: default_redaction_enabled(),
            patterns: default_redaction_patterns(),
            replacement: default_redaction_replacement(),
        }
    }
}

/// A pattern for identifying sensitive data.
#[derive(Debug, Clone, Deserialize)]
pub struct RedactionPattern {
    pub name: String,

    /// Field name fragments to match (case-insensitive substring)
    #[serde(default)]
    pub field_names: Vec<String>,

    /// Regex matched against values
    #[serde(default)]
    pub value_pattern: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redactor
// ═══════════════════════════════════════════════════════════════════════════════

/// Masks secrets in field values and JSON argument objects.
#[derive(Debug, Clone)]
pub struct SensitiveFieldRedactor {
    patterns: Vec<CompiledRedactionPattern>,
    replacement: String,
    enabled: bool,
}

#[derive(Debug, Clone)]
struct CompiledRedactionPattern {
    field_names: Vec<String>,
    value_regex: Option<regex::Regex>,
}

impl SensitiveFieldRedactor {
    /// Build a redactor. Patterns whose regex does not compile are skipped
    /// with a warning.
    pub fn new(config: &RedactionConfig) -> Self {
        let patterns = config
            .patterns
            .iter()
            .map(|p| CompiledRedactionPattern {
                field_names: p.field_names.iter().map(|s| s.to_lowercase()).collect(),
                value_regex: p.value_pattern.as_ref().and_then(|pat| match regex::Regex::new(pat) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(pattern = %p.name, error = %e, "Ignoring invalid redaction pattern");
                        None
                    }
                }),
            })
            .collect();

        Self {
            patterns,
            replacement: config.replacement.clone(),
            enabled: config.enabled,
        }
    }

    pub fn should_redact_field(&self, field_name: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let lower = field_name.to_lowercase();
        self.patterns
            .iter()
            .any(|p| p.field_names.iter().any(|f| lower.contains(f.as_str())))
    }

    /// Replace every value-pattern match inside `value`.
    pub fn redact_value(&self, value: &str) -> String {
        if !self.enabled {
            return value.to_string();
        }

        let mut result = value.to_string();
        for pattern in &self.patterns {
            if let Some(regex) = &pattern.value_regex {
                result = regex.replace_all(&result, self.replacement.as_str()).into_owned();
            }
        }
        result
    }

    pub fn redact(&self, field_name: &str, value: &str) -> String {
        if self.should_redact_field(field_name) {
            return self.replacement.clone();
        }
        self.redact_value(value)
    }

    /// Redacted deep copy of a JSON value, for logging tool arguments.
    pub fn redact_json(&self, value: &Value) -> Value {
        if !self.enabled {
            return value.clone();
        }

        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| {
                        let redacted = if self.should_redact_field(k) {
                            Value::String(self.replacement.clone())
                        } else {
                            self.redact_json(v)
                        };
                        (k.clone(), redacted)
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact_json(v)).collect()),
            Value::String(s) => Value::String(self.redact_value(s)),
            other => other.clone(),
        }
    }

    /// The redactor installed by [`init_logging`], or one with default patterns.
    pub fn global() -> &'static SensitiveFieldRedactor {
        REDACTOR.get_or_init(|| SensitiveFieldRedactor::new(&RedactionConfig::default()))
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_include_target() -> bool {
    true
}

fn default_redaction_enabled() -> bool {
    true
}

fn default_redaction_replacement() -> String {
    "[REDACTED]".to_string()
}

fn default_redaction_patterns() -> Vec<RedactionPattern> {
    vec![
        RedactionPattern {
            name: "api_keys".to_string(),
            field_names: vec![
                "api_key".to_string(),
                "apikey".to_string(),
                "api-key".to_string(),
                "raw_key".to_string(),
            ],
            value_pattern: Some(r"thk_[A-Za-z0-9_-]{8,}|sk-[A-Za-z0-9_-]{20,}".to_string()),
        },
        RedactionPattern {
            name: "passwords".to_string(),
            field_names: vec![
                "password".to_string(),
                "passwd".to_string(),
                "secret".to_string(),
                "credential".to_string(),
            ],
            value_pattern: None,
        },
        RedactionPattern {
            name: "tokens".to_string(),
            field_names: vec![
                "token".to_string(),
                "bearer".to_string(),
                "authorization".to_string(),
            ],
            value_pattern: Some(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+".to_string()),
        },
    ]
}

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG`, when set, replaces `config.level`; `module_levels` are added
/// on top either way.
///
/// # Errors
///
/// Returns an error if a directive does not parse or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let _ = REDACTOR.set(SensitiveFieldRedactor::new(&config.redaction));

    let mut filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)?,
    };
    for (module, level) in &config.module_levels {
        filter = filter.add_directive(format!("{}={}", module, level).parse()?);
    }

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr)
                    .with_file(config.include_location)
                    .with_line_number(config.include_location)
                    .with_target(config.include_target),
            )
            .try_init()?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_name_redaction() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());

        assert!(redactor.should_redact_field("api_key"));
        assert!(redactor.should_redact_field("APP_PASSWORD"));
        assert!(redactor.should_redact_field("access_token"));
        assert!(!redactor.should_redact_field("per_page"));
    }

    #[test]
    fn test_value_redaction() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());

        let text = "presented thk_AbCdEfGh12345678 for the call";
        assert_eq!(redactor.redact_value(text), "presented [REDACTED] for the call");
        assert_eq!(
            redactor.redact_value("Authorization: Bearer abc.def"),
            "Authorization: [REDACTED]"
        );
        assert_eq!(redactor.redact_value("hello world"), "hello world");
    }

    #[test]
    fn test_json_redaction() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig::default());
        let args = json!({
            "site": "mainsite",
            "app_password": "hunter2",
            "nested": { "note": "key thk_0123456789abcdef" }
        });

        let redacted = redactor.redact_json(&args);
        assert_eq!(redacted["site"], "mainsite");
        assert_eq!(redacted["app_password"], "[REDACTED]");
        assert_eq!(redacted["nested"]["note"], "key [REDACTED]");
    }

    #[test]
    fn test_disabled_redactor_passes_through() {
        let redactor = SensitiveFieldRedactor::new(&RedactionConfig {
            enabled: false,
            ..Default::default()
        });
        assert_eq!(redactor.redact("password", "x"), "x");
    }

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.redaction.enabled);
    }
}
