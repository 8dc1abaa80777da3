//! Per-project instance cache with single-flight construction.
//!
//! The first caller for a project claims a slot and spawns the build; every
//! concurrent caller for the same project waits on the same outcome. Only
//! successes are kept. A failed, timed-out, cancelled or panicking build
//! releases the slot so the next call retries.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::CatalogError;
use crate::access::ProjectId;
use crate::plugins::{PluginInstance, RegistryError};
use crate::telemetry::metrics::DispatchMetrics;

type BuildResult = Result<PluginInstance, CatalogError>;

enum Slot {
    Ready(PluginInstance),
    Building {
        generation: u64,
        outcome: watch::Receiver<Option<BuildResult>>,
    },
}

/// Releases a `Building` slot when the build task ends without publishing
/// an instance, including when the task is dropped mid-flight.
struct ClaimGuard {
    slots: Arc<DashMap<ProjectId, Slot>>,
    project_id: ProjectId,
    generation: u64,
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let generation = self.generation;
        self.slots.remove_if(&self.project_id, |_, slot| {
            matches!(slot, Slot::Building { generation: g, .. } if *g == generation)
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Instance Cache
// ═══════════════════════════════════════════════════════════════════════════════

pub struct InstanceCache {
    slots: Arc<DashMap<ProjectId, Slot>>,
    next_generation: AtomicU64,
    construction_timeout: Duration,
    constructed: Arc<AtomicU64>,
}

impl InstanceCache {
    pub fn new(construction_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
            construction_timeout,
            constructed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return the cached instance for `project_id`, or build it with `build`.
    ///
    /// `build` runs on a blocking thread under the construction timeout and
    /// at most once per claim, no matter how many callers are waiting.
    pub async fn get_or_create<F>(&self, project_id: &ProjectId, plugin_type: &str, build: F) -> BuildResult
    where
        F: FnOnce() -> Result<PluginInstance, RegistryError> + Send + 'static,
    {
        let outcome = match self.slots.entry(project_id.clone()) {
            Entry::Occupied(entry) => match entry.get() {
                Slot::Ready(instance) => {
                    debug!(project_id = %project_id, "Instance cache hit");
                    return Ok(instance.clone());
                }
                Slot::Building { outcome, .. } => outcome.clone(),
            },
            Entry::Vacant(entry) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = watch::channel(None);
                entry.insert(Slot::Building {
                    generation,
                    outcome: rx.clone(),
                });
                self.spawn_build(project_id.clone(), plugin_type.to_string(), generation, tx, build);
                rx
            }
        };

        Self::wait(outcome, project_id).await
    }

    fn spawn_build<F>(
        &self,
        project_id: ProjectId,
        plugin_type: String,
        generation: u64,
        tx: watch::Sender<Option<BuildResult>>,
        build: F,
    ) where
        F: FnOnce() -> Result<PluginInstance, RegistryError> + Send + 'static,
    {
        let guard = ClaimGuard {
            slots: Arc::clone(&self.slots),
            project_id,
            generation,
        };
        let timeout = self.construction_timeout;
        let constructed = Arc::clone(&self.constructed);

        tokio::spawn(async move {
            let start = Instant::now();
            let project_id = guard.project_id.clone();

            let result = match tokio::time::timeout(timeout, tokio::task::spawn_blocking(build)).await {
                Ok(Ok(Ok(instance))) => Ok(instance),
                Ok(Ok(Err(e))) => Err(CatalogError::Registry(e)),
                Ok(Err(join_error)) => Err(CatalogError::ConstructionFailed {
                    project_id: project_id.clone(),
                    reason: if join_error.is_panic() {
                        "plugin constructor panicked".to_string()
                    } else {
                        "construction was cancelled".to_string()
                    },
                }),
                Err(_) => Err(CatalogError::ConstructionTimeout {
                    project_id: project_id.clone(),
                    timeout,
                }),
            };

            let elapsed = start.elapsed();
            DispatchMetrics::record_instance_construction(&plugin_type, result.is_ok(), elapsed);

            match &result {
                Ok(instance) => {
                    constructed.fetch_add(1, Ordering::Relaxed);
                    if let Some(mut slot) = guard.slots.get_mut(&project_id) {
                        if matches!(&*slot, Slot::Building { generation: g, .. } if *g == generation) {
                            *slot = Slot::Ready(instance.clone());
                        }
                    }
                    debug!(
                        project_id = %project_id,
                        plugin_type = %plugin_type,
                        duration_ms = elapsed.as_millis() as u64,
                        "Plugin instance ready"
                    );
                }
                Err(e) => {
                    warn!(
                        project_id = %project_id,
                        plugin_type = %plugin_type,
                        duration_ms = elapsed.as_millis() as u64,
                        error = %e,
                        "Plugin instance construction failed"
                    );
                }
            }

            drop(guard);
            let _ = tx.send(Some(result));
        });
    }

    async fn wait(mut outcome: watch::Receiver<Option<BuildResult>>, project_id: &ProjectId) -> BuildResult {
        loop {
            let current = outcome.borrow_and_update().clone();
            if let Some(result) = current {
                return result;
            }
            if outcome.changed().await.is_err() {
                let last = outcome.borrow().clone();
                return last.unwrap_or_else(|| {
                    Err(CatalogError::ConstructionFailed {
                        project_id: project_id.clone(),
                        reason: "construction was cancelled".to_string(),
                    })
                });
            }
        }
    }

    /// Drop the cached instance. Returns whether a ready instance was removed.
    ///
    /// An in-flight build for the project still completes for its waiters but
    /// is not cached.
    pub fn invalidate(&self, project_id: &ProjectId) -> bool {
        matches!(self.slots.remove(project_id), Some((_, Slot::Ready(_))))
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    pub fn is_cached(&self, project_id: &ProjectId) -> bool {
        matches!(self.slots.get(project_id).as_deref(), Some(Slot::Ready(_)))
    }

    /// Projects with a ready instance, sorted.
    pub fn cached_projects(&self) -> Vec<ProjectId> {
        let mut ids: Vec<ProjectId> = self
            .slots
            .iter()
            .filter(|entry| matches!(entry.value(), Slot::Ready(_)))
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Successful constructions since start.
    pub fn constructed_count(&self) -> u64 {
        self.constructed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCache")
            .field("slots", &self.slots.len())
            .field("construction_timeout", &self.construction_timeout)
            .finish()
    }
}
