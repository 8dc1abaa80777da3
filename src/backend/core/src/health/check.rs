//! Health status types for projects and the hub as a whole.
//!
//! - **Healthy**: every checked project answered healthy
//! - **Degraded**: some projects are unhealthy, at least one is not
//! - **Unhealthy**: every checked project is unhealthy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════════
// Health Status
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Project Health
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of one project's health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHealth {
    pub project_id: String,

    pub plugin_type: String,

    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Time spent obtaining the instance and running its check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,

    pub checked_at: DateTime<Utc>,

    /// Set when the project could not be checked at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProjectHealth {
    pub fn healthy(project_id: impl Into<String>, plugin_type: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            plugin_type: plugin_type.into(),
            status: HealthStatus::Healthy,
            message: None,
            latency_ms: None,
            checked_at: Utc::now(),
            error: None,
        }
    }

    pub fn unhealthy(project_id: impl Into<String>, plugin_type: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            ..Self::healthy(project_id, plugin_type)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = Some(latency.as_millis() as u64);
        self
    }

    /// Add an error message (sets status to Unhealthy).
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.status = HealthStatus::Unhealthy;
        self.error = Some(error.into());
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Report
// ═══════════════════════════════════════════════════════════════════════════════

/// Aggregated health of every configured project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,

    pub timestamp: DateTime<Utc>,

    pub summary: HealthSummary,

    /// Project id → health, sorted
    pub projects: BTreeMap<String, ProjectHealth>,
}

impl HealthReport {
    pub fn new() -> Self {
        Self {
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            summary: HealthSummary::default(),
            projects: BTreeMap::new(),
        }
    }

    pub fn with_projects(mut self, projects: impl IntoIterator<Item = ProjectHealth>) -> Self {
        for project in projects {
            self.projects.insert(project.project_id.clone(), project);
        }
        self.update_summary();
        self
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    pub fn get_project(&self, project_id: &str) -> Option<&ProjectHealth> {
        self.projects.get(project_id)
    }

    fn update_summary(&mut self) {
        let mut summary = HealthSummary {
            total: self.projects.len(),
            ..HealthSummary::default()
        };
        for project in self.projects.values() {
            match project.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Degraded => summary.degraded += 1,
                HealthStatus::Unhealthy => summary.unhealthy += 1,
            }
        }

        self.status = if summary.unhealthy == 0 && summary.degraded == 0 {
            HealthStatus::Healthy
        } else if summary.unhealthy < summary.total {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
        self.summary = summary;
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
}
