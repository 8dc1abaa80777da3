//! Prometheus metrics for tool dispatch, access control and plugin instances.
//!
//! This module provides:
//!
//! - Tool call counters and latency histograms by tool, plugin type and outcome
//! - Access denial counters by reason
//! - Instance construction counters and durations by plugin type
//! - Rate limit rejection counters
//!
//! Recording is always safe: without an installed recorder the macros are no-ops.
//!
//! # Example
//!
//! ```rust,no_run
//! use toolhub_core::telemetry::metrics::DispatchMetrics;
//! use std::time::Duration;
//!
//! DispatchMetrics::record_tool_call("wordpress_list_posts", "wordpress", "success", Duration::from_millis(12));
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether to install the Prometheus recorder
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Labels added to every metric
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
}

/// Handle to the installed recorder.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder installed.
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder process-wide.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }
    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    describe_counter!("toolhub_tool_calls_total", "Tool calls by tool, plugin type and outcome");
    describe_histogram!(
        "toolhub_tool_call_duration_seconds",
        "Tool call latency in seconds"
    );
    describe_counter!("toolhub_access_denied_total", "Calls denied by the access policy");
    describe_counter!("toolhub_rate_limited_total", "Calls rejected by the rate limiter");
    describe_counter!(
        "toolhub_instances_constructed_total",
        "Plugin instance constructions by plugin type and result"
    );
    describe_histogram!(
        "toolhub_instance_construction_seconds",
        "Plugin instance construction time in seconds"
    );
    describe_gauge!("toolhub_cached_instances", "Plugin instances currently cached");
    describe_counter!("toolhub_errors_total", "Errors by code, category and severity");
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dispatch Metrics
// ═══════════════════════════════════════════════════════════════════════════════

/// Recording helpers for the dispatch path.
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record one completed tool call. `plugin_type` is `"system"` for system tools.
    pub fn record_tool_call(tool: &str, plugin_type: &str, outcome: &str, duration: Duration) {
        counter!(
            "toolhub_tool_calls_total",
            "tool" => tool.to_string(),
            "plugin_type" => plugin_type.to_string(),
            "outcome" => outcome.to_string(),
        )
        .increment(1);

        histogram!(
            "toolhub_tool_call_duration_seconds",
            "plugin_type" => plugin_type.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    pub fn record_access_denied(tool: &str, reason: &str) {
        counter!(
            "toolhub_access_denied_total",
            "tool" => tool.to_string(),
            "reason" => reason.to_string(),
        )
        .increment(1);
    }

    pub fn record_rate_limited(key_id: &str) {
        counter!("toolhub_rate_limited_total", "key_id" => key_id.to_string()).increment(1);
    }

    pub fn record_instance_construction(plugin_type: &str, success: bool, duration: Duration) {
        counter!(
            "toolhub_instances_constructed_total",
            "plugin_type" => plugin_type.to_string(),
            "success" => success.to_string(),
        )
        .increment(1);

        histogram!(
            "toolhub_instance_construction_seconds",
            "plugin_type" => plugin_type.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    pub fn set_cached_instances(count: usize) {
        gauge!("toolhub_cached_instances").set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        let registry = init_metrics(&config, "toolhub").unwrap();
        assert!(!registry.is_enabled());
        assert!(registry.render().is_empty());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        DispatchMetrics::record_tool_call("wordpress_list_posts", "wordpress", "success", Duration::from_millis(3));
        DispatchMetrics::record_access_denied("list_projects", "system_tool_requires_global_key");
        DispatchMetrics::record_instance_construction("wordpress", false, Duration::from_millis(1));
    }
}
