//! In-process call statistics backing `get_system_metrics` and
//! `get_system_uptime`.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free call counters.
#[derive(Debug)]
pub struct HubStats {
    started_at: DateTime<Utc>,
    started: Instant,
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    /// Sum of call durations (microseconds)
    total_response_time_us: AtomicU64,
    tool_calls: DashMap<String, AtomicU64>,
}

/// Point-in-time view of [`HubStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub uptime: String,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub average_response_time_ms: f64,
    /// Failed calls as a percentage of all calls
    pub error_rate: f64,
    pub calls_per_minute: f64,
    pub tool_calls: BTreeMap<String, u64>,
}

impl HubStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            tool_calls: DashMap::new(),
        }
    }

    pub fn record_call(&self, tool: &str, success: bool, duration: Duration) {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_calls.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.total_response_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        if let Some(counter) = self.tool_calls.get(tool) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.tool_calls
            .entry(tool.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let total = self.total_calls.load(Ordering::Relaxed);
        let successful = self.successful_calls.load(Ordering::Relaxed);
        let failed = self.failed_calls.load(Ordering::Relaxed);
        let total_us = self.total_response_time_us.load(Ordering::Relaxed);
        let uptime = self.uptime();

        let (average_response_time_ms, error_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                total_us as f64 / total as f64 / 1000.0,
                failed as f64 / total as f64 * 100.0,
            )
        };
        let minutes = uptime.as_secs_f64() / 60.0;
        let calls_per_minute = if minutes > 0.0 { total as f64 / minutes } else { 0.0 };

        StatsSnapshot {
            started_at: self.started_at,
            uptime_seconds: uptime.as_secs(),
            uptime: format_uptime(uptime),
            total_calls: total,
            successful_calls: successful,
            failed_calls: failed,
            average_response_time_ms,
            error_rate,
            calls_per_minute,
            tool_calls: self
                .tool_calls
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

impl Default for HubStats {
    fn default() -> Self {
        Self::new()
    }
}

/// `1d 2h 3m 4s`, omitting leading zero units.
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) = (secs / 86_400, (secs % 86_400) / 3_600, (secs % 3_600) / 60, secs % 60);

    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, seconds)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
