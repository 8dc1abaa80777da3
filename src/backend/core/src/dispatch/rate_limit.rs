//! Per-key sliding window rate limiting.
//!
//! Each API key gets a two-bucket sliding window: the previous minute's count
//! is weighted by how much of it still overlaps the trailing 60 seconds.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::telemetry::metrics::DispatchMetrics;

const WINDOW: Duration = Duration::from_secs(60);

/// `[rate_limit]` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Calls allowed per key per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_minute() -> u64 {
    60
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sliding Window
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct WindowEntry {
    current_count: u64,
    previous_count: u64,
    window_start: Instant,
}

impl WindowEntry {
    fn new() -> Self {
        Self {
            current_count: 0,
            previous_count: 0,
            window_start: Instant::now(),
        }
    }

    /// Count over the trailing window, interpolating the previous bucket.
    fn weighted_count(&mut self) -> u64 {
        self.maybe_rotate();

        let progress = self.window_start.elapsed().as_secs_f64() / WINDOW.as_secs_f64();
        let previous_weight = (1.0 - progress).max(0.0);
        (self.current_count as f64 + self.previous_count as f64 * previous_weight).ceil() as u64
    }

    fn maybe_rotate(&mut self) {
        let elapsed = self.window_start.elapsed();
        if elapsed < WINDOW {
            return;
        }

        let windows_passed = (elapsed.as_secs_f64() / WINDOW.as_secs_f64()) as u32;
        self.previous_count = if windows_passed >= 2 { 0 } else { self.current_count };
        self.current_count = 0;
        self.window_start += WINDOW * windows_passed;
    }

    fn retry_after_secs(&self) -> u64 {
        WINDOW
            .saturating_sub(self.window_start.elapsed())
            .as_secs()
            .max(1)
    }
}

/// Outcome of one rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// Set when the call was rejected
    pub retry_after_secs: Option<u64>,
}

/// Snapshot reported by `get_rate_limit_stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitStats {
    pub enabled: bool,
    pub requests_per_minute: u64,
    pub tracked_keys: usize,
    pub total_rejections: u64,
    /// Current weighted usage per key id, sorted by key id
    pub usage: Vec<KeyUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyUsage {
    pub key_id: String,
    pub current: u64,
    pub remaining: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rate Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory per-key limiter. Entries are independent; a check only locks
/// the caller's own window.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, RwLock<WindowEntry>>,
    rejections: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            rejections: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count one call for `key_id`. Rejected calls are not counted against
    /// the window.
    pub fn check(&self, key_id: &str) -> RateLimitResult {
        let limit = self.config.requests_per_minute;
        let reset_at = Utc::now() + chrono::Duration::seconds(WINDOW.as_secs() as i64);

        if !self.config.enabled {
            return RateLimitResult {
                allowed: true,
                limit,
                remaining: limit,
                reset_at,
                retry_after_secs: None,
            };
        }

        let entry = self
            .windows
            .entry(key_id.to_string())
            .or_insert_with(|| RwLock::new(WindowEntry::new()));
        let mut window = entry.write();

        let count = window.weighted_count();
        if count >= limit {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            DispatchMetrics::record_rate_limited(key_id);
            tracing::warn!(key_id = %key_id, limit, "Rate limit exceeded");
            return RateLimitResult {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
                retry_after_secs: Some(window.retry_after_secs()),
            };
        }

        window.current_count += 1;
        RateLimitResult {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(count + 1),
            reset_at,
            retry_after_secs: None,
        }
    }

    /// Forget the window for `key_id`, e.g. after the key is revoked.
    pub fn reset(&self, key_id: &str) {
        self.windows.remove(key_id);
    }

    pub fn total_rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> RateLimitStats {
        let limit = self.config.requests_per_minute;
        let mut usage: Vec<KeyUsage> = self
            .windows
            .iter()
            .map(|entry| {
                let current = entry.value().write().weighted_count();
                KeyUsage {
                    key_id: entry.key().clone(),
                    current,
                    remaining: limit.saturating_sub(current),
                }
            })
            .collect();
        usage.sort_by(|a, b| a.key_id.cmp(&b.key_id));

        RateLimitStats {
            enabled: self.config.enabled,
            requests_per_minute: limit,
            tracked_keys: usage.len(),
            total_rejections: self.total_rejections(),
            usage,
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
