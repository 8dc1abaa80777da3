//! Error handling for ToolHub Core.
//!
//! This module provides:
//! - A single crate error type, [`HubError`], with stable machine-readable codes
//! - A split between startup-fatal and per-call (recoverable) failures
//! - User-facing messages kept apart from internal diagnostics
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use toolhub_core::error::{HubError, Result};
//!
//! fn lookup(name: &str) -> Result<()> {
//!     Err(HubError::unknown_tool(name))
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::access::KeyStoreError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::plugins::RegistryError;
use crate::tools::ToolGenerationError;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by callers for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Startup (1000-1099)
    DuplicateType,
    ContractViolation,
    ToolNameCollision,

    // Routing (1100-1199)
    UnknownTool,
    UnknownSite,
    InvalidArguments,

    // Access (1200-1299)
    Authentication,
    Authorization,
    RateLimited,

    // Plugins (1300-1399)
    Configuration,
    Upstream,

    // Key management (1400-1499)
    KeyNotFound,
    KeyStore,

    // Internal (9000-9999)
    Internal,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::DuplicateType => 1000,
            Self::ContractViolation => 1001,
            Self::ToolNameCollision => 1002,

            Self::UnknownTool => 1100,
            Self::UnknownSite => 1101,
            Self::InvalidArguments => 1102,

            Self::Authentication => 1200,
            Self::Authorization => 1201,
            Self::RateLimited => 1202,

            Self::Configuration => 1300,
            Self::Upstream => 1301,

            Self::KeyNotFound => 1400,
            Self::KeyStore => 1401,

            Self::Internal => 9000,
        }
    }

    /// Stable error kind reported to callers.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateType => "DuplicateTypeError",
            Self::ContractViolation => "ContractViolationError",
            Self::ToolNameCollision => "ToolNameCollisionError",
            Self::UnknownTool => "UnknownToolError",
            Self::UnknownSite => "UnknownSiteError",
            Self::InvalidArguments => "InvalidArgumentsError",
            Self::Authentication => "AuthenticationError",
            Self::Authorization => "AuthorizationError",
            Self::RateLimited => "RateLimitError",
            Self::Configuration => "ConfigurationError",
            Self::Upstream => "UpstreamError",
            Self::KeyNotFound => "KeyNotFoundError",
            Self::KeyStore => "KeyStoreError",
            Self::Internal => "InternalError",
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::DuplicateType | Self::ContractViolation | Self::ToolNameCollision => "startup",
            Self::UnknownTool | Self::UnknownSite | Self::InvalidArguments => "routing",
            Self::Authentication | Self::Authorization | Self::RateLimited => "access",
            Self::Configuration | Self::Upstream => "plugin",
            Self::KeyNotFound | Self::KeyStore => "keys",
            Self::Internal => "internal",
        }
    }

    /// Check if this error is retryable.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Upstream)
    }

    /// Startup errors indicate a programming or configuration defect and
    /// abort hub construction.
    pub const fn is_startup_fatal(&self) -> bool {
        matches!(
            self,
            Self::DuplicateType | Self::ContractViolation | Self::ToolNameCollision
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging and alerting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, unknown names)
    Low,
    /// Operational issues (denials, rate limits, upstream failures)
    Medium,
    /// Misconfiguration or storage failures
    High,
    /// Startup defects and internal bugs
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::UnknownTool
            | ErrorCode::UnknownSite
            | ErrorCode::InvalidArguments
            | ErrorCode::KeyNotFound => Self::Low,

            ErrorCode::Authentication
            | ErrorCode::Authorization
            | ErrorCode::RateLimited
            | ErrorCode::Upstream => Self::Medium,

            ErrorCode::Configuration | ErrorCode::KeyStore => Self::High,

            ErrorCode::DuplicateType
            | ErrorCode::ContractViolation
            | ErrorCode::ToolNameCollision
            | ErrorCode::Internal => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID (tool, project, key)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Retry information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,

    /// Suggested action for resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after_secs = Some(seconds);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggested_action = Some(suggestion.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.context.is_empty()
            && self.entity_id.is_none()
            && self.retry_after_secs.is_none()
            && self.suggested_action.is_none()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for ToolHub Core.
#[derive(Error, Debug)]
pub struct HubError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-facing error message (safe to return to callers)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.kind(), self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl HubError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, "An internal error occurred")
            .with_internal_message(message)
    }

    pub fn unknown_tool(tool_name: &str) -> Self {
        Self::new(
            ErrorCode::UnknownTool,
            format!("tool '{}' does not exist", tool_name),
        )
        .with_details(ErrorDetails::new().with_entity("tool", tool_name))
    }

    pub fn invalid_arguments(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArguments, message)
    }

    pub fn authentication(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Authentication, message)
    }

    /// Access was denied by the access policy; `reason` is returned verbatim.
    pub fn authorization(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Authorization, reason)
    }

    pub fn rate_limited(key_id: &str, retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimited,
            format!("rate limit exceeded, retry after {}s", retry_after_secs),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("api_key", key_id)
                .with_retry_after(retry_after_secs),
        )
    }

    /// A plugin method failed while serving a call.
    pub fn upstream(plugin_type: &str, project_id: &str, message: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::Upstream,
            format!("{} plugin call for project '{}' failed: {}", plugin_type, project_id, message),
        )
        .with_details(
            ErrorDetails::new()
                .with_entity("project", project_id)
                .with_context("plugin_type", plugin_type),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    /// Attach a suggested action.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.details.suggested_action = Some(suggestion.into());
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Get the stable error kind.
    pub fn kind(&self) -> &'static str {
        self.code.kind()
    }

    /// Get the user-facing message.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Get the internal message (if any).
    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    /// Get the error details.
    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let kind = self.code.kind();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_kind = kind,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_kind = kind,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_kind = kind,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_kind = kind,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn record_metrics(&self) {
        counter!(
            "toolhub_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Caller-visible Envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// Error envelope returned across the call boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Whether the call was successful (always false for errors)
    pub success: bool,

    /// Error information
    pub error: ErrorInfo,
}

/// Detailed error information for callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error kind (e.g. `UnknownSiteError`)
    pub kind: String,

    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,

    /// Timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&HubError> for ErrorResponse {
    fn from(error: &HubError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                kind: error.code.kind().to_string(),
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: if error.details.is_empty() {
                    None
                } else {
                    Some(error.details.clone())
                },
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations for Component Errors
// ═══════════════════════════════════════════════════════════════════════════════

impl From<RegistryError> for HubError {
    fn from(error: RegistryError) -> Self {
        let message = error.to_string();
        match &error {
            RegistryError::DuplicateType(type_id) => Self::new(ErrorCode::DuplicateType, message)
                .with_details(ErrorDetails::new().with_entity("plugin_type", type_id)),
            RegistryError::ContractViolation { type_id, .. } => {
                Self::new(ErrorCode::ContractViolation, message)
                    .with_details(ErrorDetails::new().with_entity("plugin_type", type_id))
            }
            RegistryError::UnknownType(type_id) => Self::new(ErrorCode::Configuration, message)
                .with_details(ErrorDetails::new().with_entity("plugin_type", type_id))
                .with_suggestion("Register the plugin type before configuring projects for it"),
            RegistryError::MissingConfig {
                type_id,
                project_id,
                missing,
            } => {
                let env_hint: Vec<String> = missing
                    .iter()
                    .map(|key| configuration_env_var(project_id, type_id, key))
                    .collect();
                Self::new(ErrorCode::Configuration, message)
                    .with_details(
                        ErrorDetails::new()
                            .with_entity("project", project_id)
                            .with_context("plugin_type", type_id)
                            .with_context("missing_keys", missing),
                    )
                    .with_suggestion(format!(
                        "Set the missing settings in the project config or via environment variables: {}",
                        env_hint.join(", ")
                    ))
            }
            RegistryError::Construction {
                type_id,
                project_id,
                ..
            } => Self::new(ErrorCode::Configuration, message)
                .with_details(
                    ErrorDetails::new()
                        .with_entity("project", project_id)
                        .with_context("plugin_type", type_id),
                )
                .with_suggestion("Check the project's settings and credentials"),
        }
        .with_source(error)
    }
}

/// Environment variable that would supply `key` for a discovered project.
fn configuration_env_var(project_id: &str, plugin_type: &str, key: &str) -> String {
    let site = project_id
        .strip_prefix(plugin_type)
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(project_id);
    format!(
        "{}_{}_{}",
        plugin_type.to_uppercase(),
        site.to_uppercase(),
        key.to_uppercase()
    )
}

impl From<CatalogError> for HubError {
    fn from(error: CatalogError) -> Self {
        let message = error.to_string();
        match &error {
            CatalogError::UnknownSite { site, .. } => Self::new(ErrorCode::UnknownSite, message)
                .with_details(ErrorDetails::new().with_entity("site", site.as_str()))
                .with_suggestion("Call list_projects to see configured projects and aliases"),
            CatalogError::UnknownProject(project_id) => Self::new(ErrorCode::UnknownSite, message)
                .with_details(ErrorDetails::new().with_entity("project", project_id.as_str())),
            CatalogError::AmbiguousSite { site, .. } => Self::new(ErrorCode::InvalidArguments, message)
                .with_details(ErrorDetails::new().with_entity("site", site.as_str())),
            CatalogError::DuplicateProject(_) => Self::new(ErrorCode::Configuration, message),
            CatalogError::Registry(inner) => return HubError::from(inner.clone()),
            CatalogError::ConstructionTimeout { project_id, .. }
            | CatalogError::ConstructionFailed { project_id, .. } => {
                Self::new(ErrorCode::Upstream, message)
                    .with_details(ErrorDetails::new().with_entity("project", project_id.as_str()))
            }
        }
        .with_source(error)
    }
}

impl From<ToolGenerationError> for HubError {
    fn from(error: ToolGenerationError) -> Self {
        let name = error.tool_name().to_string();
        Self::new(ErrorCode::ToolNameCollision, error.to_string())
            .with_details(ErrorDetails::new().with_entity("tool", name))
            .with_source(error)
    }
}

impl From<KeyStoreError> for HubError {
    fn from(error: KeyStoreError) -> Self {
        let message = error.to_string();
        match &error {
            KeyStoreError::InvalidKey | KeyStoreError::Revoked(_) | KeyStoreError::Expired(_) => {
                Self::new(ErrorCode::Authentication, message)
            }
            KeyStoreError::NotFound(key_id) => Self::new(ErrorCode::KeyNotFound, message)
                .with_details(ErrorDetails::new().with_entity("api_key", key_id)),
            KeyStoreError::AlreadyRevoked(key_id) => Self::new(ErrorCode::InvalidArguments, message)
                .with_details(ErrorDetails::new().with_entity("api_key", key_id)),
            KeyStoreError::Io(_) | KeyStoreError::Serialization(_) => {
                Self::new(ErrorCode::KeyStore, "API key store is unavailable")
                    .with_internal_message(message)
            }
        }
        .with_source(error)
    }
}

impl From<ConfigError> for HubError {
    fn from(error: ConfigError) -> Self {
        Self::new(ErrorCode::Configuration, error.to_string())
            .with_suggestion("Check the configuration file and TOOLHUB__* environment variables")
            .with_source(error)
    }
}

impl From<serde_json::Error> for HubError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(ErrorCode::Internal, "Failed to serialize result")
            .with_internal_message(error.to_string())
            .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::ProjectId;

    #[test]
    fn test_error_code_kind_is_stable() {
        assert_eq!(ErrorCode::UnknownTool.kind(), "UnknownToolError");
        assert_eq!(ErrorCode::UnknownSite.kind(), "UnknownSiteError");
        assert_eq!(ErrorCode::Authorization.kind(), "AuthorizationError");
        assert_eq!(ErrorCode::Configuration.kind(), "ConfigurationError");
        assert_eq!(ErrorCode::Upstream.kind(), "UpstreamError");
    }

    #[test]
    fn test_startup_fatal_codes() {
        assert!(ErrorCode::DuplicateType.is_startup_fatal());
        assert!(ErrorCode::ContractViolation.is_startup_fatal());
        assert!(ErrorCode::ToolNameCollision.is_startup_fatal());
        assert!(!ErrorCode::UnknownSite.is_startup_fatal());
        assert!(!ErrorCode::Upstream.is_startup_fatal());
    }

    #[test]
    fn test_error_code_is_retryable() {
        assert!(ErrorCode::RateLimited.is_retryable());
        assert!(ErrorCode::Upstream.is_retryable());
        assert!(!ErrorCode::Authorization.is_retryable());
        assert!(!ErrorCode::UnknownTool.is_retryable());
    }

    #[test]
    fn test_error_context() {
        let error = HubError::invalid_arguments("bad input")
            .with_context("field", "site")
            .with_context("reason", "missing");

        assert!(error.details().context.contains_key("field"));
        assert!(error.details().context.contains_key("reason"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = HubError::unknown_tool("nope_tool");
        let response = ErrorResponse::from(&error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("UNKNOWN_TOOL"));
        assert!(json.contains("UnknownToolError"));
        assert!(json.contains("nope_tool"));
        assert!(!response.success);
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::UnknownSite),
            ErrorSeverity::Low
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::Authorization),
            ErrorSeverity::Medium
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::Configuration),
            ErrorSeverity::High
        );
        assert_eq!(
            ErrorSeverity::from_code(&ErrorCode::ToolNameCollision),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_missing_config_suggests_env_vars() {
        let error = HubError::from(RegistryError::MissingConfig {
            type_id: "wordpress".into(),
            project_id: "wordpress_site1".into(),
            missing: vec!["url".into(), "app_password".into()],
        });

        assert_eq!(error.code(), ErrorCode::Configuration);
        let suggestion = error.details().suggested_action.clone().unwrap();
        assert!(suggestion.contains("WORDPRESS_SITE1_URL"));
        assert!(suggestion.contains("WORDPRESS_SITE1_APP_PASSWORD"));
    }

    #[test]
    fn test_unknown_site_maps_to_routing_error() {
        let error = HubError::from(CatalogError::UnknownSite {
            site: "foo".into(),
            plugin_type: None,
        });
        assert_eq!(error.code(), ErrorCode::UnknownSite);
        assert!(error.user_message().contains("site 'foo' is not configured"));
    }

    #[test]
    fn test_construction_timeout_is_upstream() {
        let error = HubError::from(CatalogError::ConstructionTimeout {
            project_id: ProjectId::new("gitea_main"),
            timeout: std::time::Duration::from_secs(3),
        });
        assert_eq!(error.code(), ErrorCode::Upstream);
    }

    #[test]
    fn test_error_display() {
        let error = HubError::internal("lock poisoned");

        let display = format!("{}", error);
        assert!(display.contains("InternalError"));
        assert!(display.contains("An internal error occurred"));
        assert!(display.contains("lock poisoned"));
    }
}
