//! Registry of per-surface polling tasks.
//!
//! Responsibilities:
//! - Start one worker per enabled surface and stop the ones no longer enabled.
//! - Cancel pending ticks on stop and optionally restore original names.
//! - Expose per-surface status for operators.
//!
//! Non-responsibilities:
//! - Persisting configuration (the store does this; callers update it first).
//! - Deciding who may change configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use parking_lot::Mutex;
use tokio::sync::{Notify, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::market::resolver::QuoteResolver;
use crate::metrics::counters::Counters;
use crate::scheduler::state::{StatusSnapshot, SurfaceKey, TickerStatus};
use crate::scheduler::worker::{SurfaceWorker, TickContext};
use crate::store::model::TickerConfig;
use crate::store::repository::TickerConfigStore;
use crate::surface::SurfaceRenamer;

struct SurfaceHandle {
    /// Distinguishes a restarted surface from the worker it replaced.
    generation: u64,
    cancel: CancellationToken,
    wake: Arc<Notify>,
    status: watch::Receiver<TickerStatus>,
}

/// group id → surface id → handle. A group entry exists only while it has at
/// least one scheduled surface.
type Registry = HashMap<String, HashMap<String, SurfaceHandle>>;

#[derive(Clone)]
pub struct TickerScheduler {
    ctx: TickContext,
    registry: Arc<Mutex<Registry>>,
    generation: Arc<AtomicU64>,
    /// Parent of every surface token; cancelled only by `stop_all`.
    root: CancellationToken,
}

impl TickerScheduler {
    pub fn new(
        store: Arc<dyn TickerConfigStore>,
        resolver: QuoteResolver,
        renamer: Arc<dyn SurfaceRenamer>,
        counters: Counters,
    ) -> Self {
        Self {
            ctx: TickContext {
                store,
                resolver,
                renamer,
                counters,
            },
            registry: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            root: CancellationToken::new(),
        }
    }

    /// Schedules every enabled surface of the group that is not already
    /// running and stops the ones that are no longer enabled.
    /// Returns how many surfaces were newly scheduled.
    #[instrument(skip(self))]
    pub async fn start(&self, group_id: &str) -> anyhow::Result<usize> {
        let group = self
            .ctx
            .store
            .get_or_create(group_id)
            .await
            .with_context(|| format!("failed to load config for group {group_id}"))?;

        let enabled: HashMap<&str, &TickerConfig> = group
            .enabled_tickers()
            .map(|t| (t.surface_id.as_str(), t))
            .collect();

        if enabled.is_empty() {
            let stopped = self.stop(group_id, false).await;
            debug!(stopped, "no enabled tickers; group idle");
            return Ok(0);
        }

        let mut started = 0;
        let mut registry = self.registry.lock();
        let surfaces = registry.entry(group_id.to_string()).or_default();

        surfaces.retain(|surface_id, handle| {
            let keep = enabled.contains_key(surface_id.as_str());
            if !keep {
                handle.cancel.cancel();
                info!(surface_id = %surface_id, "ticker no longer enabled; stopped");
            }
            keep
        });

        for (surface_id, ticker) in &enabled {
            if surfaces.contains_key(*surface_id) {
                continue;
            }
            let handle = self.spawn_worker(SurfaceKey::new(group_id, surface_id), ticker);
            surfaces.insert(surface_id.to_string(), handle);
            started += 1;
        }

        info!(started, active = surfaces.len(), "group tickers started");
        Ok(started)
    }

    /// `start`, then wakes every scheduled surface of the group so edited
    /// settings apply on the next tick instead of after the pending delay.
    pub async fn refresh(&self, group_id: &str) -> anyhow::Result<usize> {
        let started = self.start(group_id).await?;

        if let Some(surfaces) = self.registry.lock().get(group_id) {
            for handle in surfaces.values() {
                handle.wake.notify_one();
            }
        }

        Ok(started)
    }

    /// Stops every surface of the group. Returns how many were stopped.
    #[instrument(skip(self))]
    pub async fn stop(&self, group_id: &str, restore: bool) -> usize {
        let removed: Vec<String> = {
            let mut registry = self.registry.lock();
            let Some(surfaces) = registry.remove(group_id) else {
                return 0;
            };
            surfaces
                .into_iter()
                .map(|(surface_id, handle)| {
                    handle.cancel.cancel();
                    surface_id
                })
                .collect()
        };

        if restore {
            self.restore_original_names(group_id, &removed).await;
        }

        info!(stopped = removed.len(), restore, "group tickers stopped");
        removed.len()
    }

    /// Stops a single surface. Returns whether it was scheduled.
    #[instrument(skip(self))]
    pub async fn stop_surface(&self, group_id: &str, surface_id: &str, restore: bool) -> bool {
        let was_scheduled = {
            let mut registry = self.registry.lock();
            let removed = registry
                .get_mut(group_id)
                .and_then(|surfaces| surfaces.remove(surface_id));
            if registry.get(group_id).is_some_and(HashMap::is_empty) {
                registry.remove(group_id);
            }
            removed.map(|h| h.cancel.cancel()).is_some()
        };

        if restore {
            self.restore_original_names(group_id, &[surface_id.to_string()])
                .await;
        }

        was_scheduled
    }

    /// Stops every group, e.g. on shutdown.
    pub async fn stop_all(&self, restore: bool) -> usize {
        let groups: Vec<String> = self.registry.lock().keys().cloned().collect();

        let mut stopped = 0;
        for group_id in &groups {
            stopped += self.stop(group_id, restore).await;
        }
        self.root.cancel();

        info!(groups = groups.len(), stopped, "all tickers stopped");
        stopped
    }

    /// Starts every group that has at least one enabled ticker.
    /// A group that fails to start is logged and skipped.
    pub async fn bootstrap(&self) -> anyhow::Result<usize> {
        let groups = self
            .ctx
            .store
            .find_groups_with_active_tickers()
            .await
            .context("failed to list groups with active tickers")?;

        let mut started = 0;
        for group_id in &groups {
            match self.start(group_id).await {
                Ok(n) => started += n,
                Err(e) => warn!(group_id = %group_id, error = %e, "group failed to start"),
            }
        }

        info!(groups = groups.len(), started, "tickers bootstrapped");
        Ok(started)
    }

    /// Per-surface status for the group, ordered by surface id.
    pub fn statuses(&self, group_id: &str) -> Vec<StatusSnapshot> {
        let now = Instant::now();
        let registry = self.registry.lock();

        let mut out: Vec<StatusSnapshot> = registry
            .get(group_id)
            .map(|surfaces| {
                surfaces
                    .iter()
                    .map(|(surface_id, h)| StatusSnapshot::new(surface_id, &h.status.borrow(), now))
                    .collect()
            })
            .unwrap_or_default();

        out.sort_by(|a, b| a.surface_id.cmp(&b.surface_id));
        out
    }

    pub fn is_scheduled(&self, group_id: &str, surface_id: &str) -> bool {
        self.registry
            .lock()
            .get(group_id)
            .is_some_and(|s| s.contains_key(surface_id))
    }

    pub fn active_groups(&self) -> usize {
        self.registry.lock().len()
    }

    fn spawn_worker(&self, key: SurfaceKey, ticker: &TickerConfig) -> SurfaceHandle {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = self.root.child_token();
        let wake = Arc::new(Notify::new());

        let (worker, status) = SurfaceWorker::new(key.clone(), self.ctx.clone(), ticker.base_interval());

        debug!(surface = %key, generation, "surface worker spawned");

        let registry = Arc::clone(&self.registry);
        let task_cancel = cancel.clone();
        let task_wake = Arc::clone(&wake);
        tokio::spawn(async move {
            worker.run(task_cancel, task_wake).await;
            release(&registry, &key, generation);
        });

        SurfaceHandle {
            generation,
            cancel,
            wake,
            status,
        }
    }

    /// Best effort: puts the recorded original name back on each surface.
    /// Skipped when the surface already shows it; failures are only logged.
    async fn restore_original_names(&self, group_id: &str, surface_ids: &[String]) {
        let group = match self.ctx.store.get_or_create(group_id).await {
            Ok(g) => g,
            Err(e) => {
                warn!(group_id, error = %e, "cannot restore names; config unavailable");
                return;
            }
        };

        for surface_id in surface_ids {
            let Some(original) = group
                .ticker(surface_id)
                .and_then(|t| t.original_name.as_deref())
                .filter(|n| !n.is_empty())
            else {
                continue;
            };

            let renamer = &self.ctx.renamer;
            match renamer.current_name(group_id, surface_id).await {
                Ok(Some(current)) if current == original => {
                    debug!(surface_id = %surface_id, "original name already shown");
                }
                Ok(Some(_)) => match renamer.rename(group_id, surface_id, original).await {
                    Ok(()) => info!(surface_id = %surface_id, name = original, "original name restored"),
                    Err(e) => warn!(surface_id = %surface_id, error = %e, "failed to restore original name"),
                },
                Ok(None) => debug!(surface_id = %surface_id, "surface gone; nothing to restore"),
                Err(e) => warn!(surface_id = %surface_id, error = %e, "failed to read surface name"),
            }
        }
    }
}

/// Drops the registry entry of a worker that exited on its own, unless the
/// surface has since been rescheduled under a newer generation.
fn release(registry: &Mutex<Registry>, key: &SurfaceKey, generation: u64) {
    let mut registry = registry.lock();
    let Some(surfaces) = registry.get_mut(&key.group_id) else {
        return;
    };
    if surfaces
        .get(&key.surface_id)
        .is_some_and(|h| h.generation == generation)
    {
        surfaces.remove(&key.surface_id);
        debug!(surface = %key, "surface released");
    }
    if surfaces.is_empty() {
        registry.remove(&key.group_id);
    }
}
