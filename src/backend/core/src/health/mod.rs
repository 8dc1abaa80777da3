//! Project health checking.
//!
//! Each project's health is its plugin instance's own health check, run under
//! a timeout. Projects are checked independently: one that cannot even be
//! constructed is reported unhealthy without affecting the rest.

mod check;

pub use check::*;

use futures::future::join_all;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::access::ProjectId;
use crate::catalog::{CatalogError, ProjectCatalog};

/// `[health]` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    /// Timeout for a single project's check, including instance construction
    #[serde(default = "default_check_timeout", with = "humantime_serde")]
    pub check_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_timeout: default_check_timeout(),
        }
    }
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Runs plugin health checks across the catalog.
#[derive(Debug, Clone)]
pub struct HealthAggregator {
    catalog: Arc<ProjectCatalog>,
    config: HealthConfig,
}

impl HealthAggregator {
    pub fn new(catalog: Arc<ProjectCatalog>, config: HealthConfig) -> Self {
        Self { catalog, config }
    }

    /// Check one project by canonical id, alias or unambiguous site id.
    ///
    /// # Errors
    ///
    /// Only an unresolvable reference is an error; construction failures and
    /// timeouts are reported as an unhealthy result.
    pub async fn check_project(&self, site_ref: &str) -> Result<ProjectHealth, CatalogError> {
        let project_id = self.catalog.resolve_reference(site_ref)?;
        Ok(self.check_resolved(&project_id).await)
    }

    /// Check every configured project concurrently.
    pub async fn check_all(&self) -> HealthReport {
        let ids: Vec<ProjectId> = self.catalog.list_project_ids().cloned().collect();
        let results = join_all(ids.iter().map(|id| self.check_resolved(id))).await;
        let report = HealthReport::new().with_projects(results);

        info!(
            status = %report.status(),
            total = report.summary.total,
            unhealthy = report.summary.unhealthy,
            "Project health check complete"
        );
        report
    }

    async fn check_resolved(&self, project_id: &ProjectId) -> ProjectHealth {
        let plugin_type = self
            .catalog
            .project(project_id)
            .map(|p| p.plugin_type.clone())
            .unwrap_or_default();
        let start = Instant::now();

        let check = async {
            let instance = self.catalog.get_or_create_instance(project_id).await?;
            Ok::<_, CatalogError>(instance.health_check().await)
        };

        let health = match tokio::time::timeout(self.config.check_timeout, check).await {
            Ok(Ok(result)) => {
                let health = if result.healthy {
                    ProjectHealth::healthy(project_id.as_str(), plugin_type.as_str())
                } else {
                    ProjectHealth::unhealthy(project_id.as_str(), plugin_type.as_str())
                };
                health.with_message(result.message)
            }
            Ok(Err(e)) => ProjectHealth::unhealthy(project_id.as_str(), plugin_type.as_str()).with_error(e.to_string()),
            Err(_) => ProjectHealth::unhealthy(project_id.as_str(), plugin_type.as_str()).with_error(format!(
                "health check timed out after {:?}",
                self.config.check_timeout
            )),
        }
        .with_latency(start.elapsed());

        debug!(
            project_id = %project_id,
            status = %health.status,
            latency_ms = health.latency_ms.unwrap_or_default(),
            "Project health checked"
        );
        health
    }
}
