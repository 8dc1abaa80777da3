//! Telemetry: structured logging and Prometheus metrics.
//!
//! - **Logging**: JSON/pretty/compact output with secret redaction
//! - **Metrics**: dispatch, access and instance-construction metrics
//!
//! # Example
//!
//! ```rust,no_run
//! use toolhub_core::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let handle = init_telemetry(&TelemetryConfig::default()).expect("telemetry");
//! println!("{}", handle.metrics.render());
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, RedactionConfig, RedactionPattern, SensitiveFieldRedactor};
pub use metrics::{init_metrics, DispatchMetrics, MetricsConfig, MetricsRegistry};

use serde::Deserialize;

/// Logging plus metrics, as configured in `[logging]` and `[metrics]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    /// Service name used as the `service` metrics label
    #[serde(default = "default_service_name")]
    pub service_name: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_service_name() -> String {
    "toolhub".to_string()
}

/// Initialize logging and metrics. Call once at process start.
///
/// # Errors
///
/// Returns an error if either subsystem fails to install.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    init_logging(&config.logging)?;

    let service_name = if config.service_name.is_empty() {
        default_service_name()
    } else {
        config.service_name.clone()
    };
    let metrics = init_metrics(&config.metrics, &service_name)?;

    ::tracing::info!(service_name = %service_name, "Telemetry initialized");
    Ok(TelemetryHandle { metrics })
}

/// Keeps the metrics recorder handle alive.
#[derive(Debug)]
pub struct TelemetryHandle {
    pub metrics: MetricsRegistry,
}
