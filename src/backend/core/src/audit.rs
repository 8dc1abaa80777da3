//! Audit trail for authentication and tool calls.
//!
//! Every entry is kept in a bounded in-memory buffer for querying and handed
//! to a background task that writes it to the `audit` tracing target. Tool
//! arguments are recorded with sensitive fields redacted.
//!
//! ```rust,ignore
//! for entry in dispatcher.audit().recent(20) {
//!     println!("{} {} {}", entry.timestamp, entry.event_type, entry.message);
//! }
//! ```

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{ErrorCode, HubError};
use crate::telemetry::SensitiveFieldRedactor;

/// Field names whose values never reach an audit entry.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "private_key",
    "access_token",
    "refresh_token",
    "authorization",
];

const REDACTED: &str = "[REDACTED]";

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// `[audit]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Entries kept in memory for [`AuditLogger::recent`] and queries
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// Entries queued for the writer task before writes fall back to the caller
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            recent_capacity: default_recent_capacity(),
            channel_buffer_size: default_channel_buffer_size(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_recent_capacity() -> usize {
    1000
}

fn default_channel_buffer_size() -> usize {
    1024
}

// ═══════════════════════════════════════════════════════════════════════════════
// Entries
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ToolCall,
    Authentication,
    AccessDenied,
    System,
}

impl AuditEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ToolCall => "tool_call",
            Self::Authentication => "authentication",
            Self::AccessDenied => "access_denied",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// One audited event.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub level: AuditLevel,
    pub success: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,

    /// Redacted tool arguments or event details
    #[serde(skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl AuditEntry {
    fn new(event_type: AuditEventType, level: AuditLevel, success: bool, message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            level,
            success,
            message,
            key_id: None,
            tool_name: None,
            site: None,
            project_id: None,
            duration_ms: None,
            error_code: None,
            details: Value::Null,
        }
    }

    /// A completed tool call. Authorization and rate-limit failures become
    /// [`AuditEventType::AccessDenied`] entries.
    pub fn tool_call(tool_name: &str, key_id: &str, outcome: Result<(), &HubError>, duration: Duration) -> Self {
        let mut entry = match outcome {
            Ok(()) => Self::new(
                AuditEventType::ToolCall,
                AuditLevel::Info,
                true,
                format!("Tool call {} succeeded", tool_name),
            ),
            Err(e) => {
                let denied = matches!(e.code(), ErrorCode::Authorization | ErrorCode::RateLimited);
                let (event_type, level, verb) = if denied {
                    (AuditEventType::AccessDenied, AuditLevel::Warning, "denied")
                } else {
                    (AuditEventType::ToolCall, AuditLevel::Error, "failed")
                };
                let mut entry = Self::new(
                    event_type,
                    level,
                    false,
                    format!("Tool call {} {}: {}", tool_name, verb, e.user_message()),
                );
                entry.error_code = Some(e.code());
                entry
            }
        };
        entry.tool_name = Some(tool_name.to_string());
        entry.key_id = Some(key_id.to_string());
        entry.duration_ms = Some(duration.as_millis() as u64);
        entry
    }

    /// A key presented for authentication. `key_id` is unknown when the key
    /// does not match any record.
    pub fn authentication(key_id: Option<&str>, failure: Option<&str>) -> Self {
        let mut entry = match failure {
            None => Self::new(
                AuditEventType::Authentication,
                AuditLevel::Info,
                true,
                "API key accepted".to_string(),
            ),
            Some(reason) => {
                let mut entry = Self::new(
                    AuditEventType::Authentication,
                    AuditLevel::Warning,
                    false,
                    format!("API key rejected: {}", reason),
                );
                entry.error_code = Some(ErrorCode::Authentication);
                entry
            }
        };
        entry.key_id = key_id.map(str::to_string);
        entry
    }

    pub fn system(message: impl Into<String>, details: Value) -> Self {
        let mut entry = Self::new(AuditEventType::System, AuditLevel::Info, true, message.into());
        entry.details = redact_params(&details);
        entry
    }

    pub fn with_site(mut self, site: Option<String>) -> Self {
        self.site = site;
        self
    }

    pub fn with_project(mut self, project_id: Option<String>) -> Self {
        self.project_id = project_id;
        self
    }

    /// Attach tool arguments, redacting sensitive fields.
    pub fn with_params(mut self, params: &Value) -> Self {
        self.details = redact_params(params);
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redaction
// ═══════════════════════════════════════════════════════════════════════════════

pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|field| lower.contains(field))
}

/// Deep copy of `value` with sensitive fields replaced and secret-looking
/// strings masked.
pub fn redact_params(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let redacted = if is_sensitive_field(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_params(v)
                    };
                    (k.clone(), redacted)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_params).collect()),
        Value::String(s) => Value::String(SensitiveFieldRedactor::global().redact_value(s)),
        other => other.clone(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════════════

/// Filters for [`AuditLogger::query`]; unset fields match everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub event_type: Option<AuditEventType>,
    #[serde(default)]
    pub level: Option<AuditLevel>,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.event_type.map_or(true, |t| entry.event_type == t)
            && self.level.map_or(true, |l| entry.level == l)
            && self.success.map_or(true, |s| entry.success == s)
            && field_matches(&self.key_id, &entry.key_id)
            && field_matches(&self.project_id, &entry.project_id)
            && field_matches(&self.tool_name, &entry.tool_name)
    }
}

fn field_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match wanted {
        Some(wanted) => actual.as_deref() == Some(wanted.as_str()),
        None => true,
    }
}

/// Counts over the retained entries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditStatistics {
    pub total_recorded: u64,
    pub retained: usize,
    pub by_type: BTreeMap<AuditEventType, usize>,
    pub by_level: BTreeMap<AuditLevel, usize>,
    /// Share of successful tool calls, `None` before the first call
    pub tool_call_success_rate: Option<f64>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Logger
// ═══════════════════════════════════════════════════════════════════════════════

/// Records audit entries.
///
/// Recording never blocks: the entry is appended to the bounded buffer and
/// offered to the writer task. Without a Tokio runtime at construction, or
/// when the queue is full, the caller writes the entry itself.
pub struct AuditLogger {
    enabled: bool,
    capacity: usize,
    recent: Mutex<VecDeque<AuditEntry>>,
    sender: Option<mpsc::Sender<AuditEntry>>,
    total: AtomicU64,
}

impl AuditLogger {
    pub fn new(config: &AuditConfig) -> Self {
        let sender = if config.enabled {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let (tx, rx) = mpsc::channel(config.channel_buffer_size.max(1));
                    handle.spawn(write_entries(rx));
                    Some(tx)
                }
                Err(_) => {
                    debug!("No Tokio runtime; audit entries are written inline");
                    None
                }
            }
        } else {
            None
        };

        Self {
            enabled: config.enabled,
            capacity: config.recent_capacity.max(1),
            recent: Mutex::new(VecDeque::new()),
            sender,
            total: AtomicU64::new(0),
        }
    }

    /// A logger that drops everything.
    pub fn disabled() -> Self {
        Self::new(&AuditConfig {
            enabled: false,
            ..Default::default()
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn record(&self, entry: AuditEntry) {
        if !self.enabled {
            return;
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        {
            let mut recent = self.recent.lock();
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(entry.clone());
        }

        match &self.sender {
            Some(sender) => {
                if let Err(e) = sender.try_send(entry) {
                    let entry = match e {
                        mpsc::error::TrySendError::Full(entry) => entry,
                        mpsc::error::TrySendError::Closed(entry) => entry,
                    };
                    write_entry(&entry);
                }
            }
            None => write_entry(&entry),
        }
    }

    /// Up to `limit` most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.recent.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Retained entries matching `query`, newest first.
    pub fn query(&self, query: &AuditQuery) -> Vec<AuditEntry> {
        let limit = query.limit.unwrap_or(self.capacity);
        self.recent
            .lock()
            .iter()
            .rev()
            .filter(|entry| query.matches(entry))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> AuditStatistics {
        let recent = self.recent.lock();
        let mut by_type = BTreeMap::new();
        let mut by_level = BTreeMap::new();
        let mut calls = 0usize;
        let mut succeeded = 0usize;

        for entry in recent.iter() {
            *by_type.entry(entry.event_type).or_insert(0) += 1;
            *by_level.entry(entry.level).or_insert(0) += 1;
            if entry.tool_name.is_some() {
                calls += 1;
                if entry.success {
                    succeeded += 1;
                }
            }
        }

        AuditStatistics {
            total_recorded: self.total.load(Ordering::Relaxed),
            retained: recent.len(),
            by_type,
            by_level,
            tool_call_success_rate: (calls > 0).then(|| succeeded as f64 / calls as f64),
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(&AuditConfig::default())
    }
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("enabled", &self.enabled)
            .field("capacity", &self.capacity)
            .field("retained", &self.recent.lock().len())
            .finish_non_exhaustive()
    }
}

async fn write_entries(mut rx: mpsc::Receiver<AuditEntry>) {
    while let Some(entry) = rx.recv().await {
        write_entry(&entry);
    }
}

fn write_entry(entry: &AuditEntry) {
    let details = match serde_json::to_string(&entry.details) {
        Ok(details) => details,
        Err(e) => {
            error!(error = %e, "Failed to serialize audit details");
            return;
        }
    };
    let key_id = entry.key_id.as_deref().unwrap_or("-");
    let tool = entry.tool_name.as_deref().unwrap_or("-");
    let project_id = entry.project_id.as_deref().unwrap_or("-");

    match entry.level {
        AuditLevel::Info => info!(
            target: "audit",
            event_type = %entry.event_type,
            key_id,
            tool,
            project_id,
            success = entry.success,
            duration_ms = ?entry.duration_ms,
            details = %details,
            "{}",
            entry.message
        ),
        AuditLevel::Warning => warn!(
            target: "audit",
            event_type = %entry.event_type,
            key_id,
            tool,
            project_id,
            success = entry.success,
            duration_ms = ?entry.duration_ms,
            details = %details,
            "{}",
            entry.message
        ),
        AuditLevel::Error => error!(
            target: "audit",
            event_type = %entry.event_type,
            key_id,
            tool,
            project_id,
            success = entry.success,
            duration_ms = ?entry.duration_ms,
            details = %details,
            "{}",
            entry.message
        ),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
