//! Background workers that empty a cache pool.
//!
//! A drain switches the tier to forward mode so no new writes land in
//! the cache, then blocks on flush-and-evict until the pool is empty.
//! At most one worker runs per cache pool. The control loop polls worker
//! status and never waits on a worker.

use std::collections::HashMap;
use std::sync::Arc;

use geotier_cluster::{CacheMode, ClusterCommand, ClusterControl, StorageContent};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Observable state of one drain worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStatus {
    Running,
    Completed,
    Failed(String),
    Cancelled,
}

impl DrainStatus {
    pub fn is_done(&self) -> bool {
        !matches!(self, DrainStatus::Running)
    }
}

/// Per-pool worker state.
struct DrainSlot {
    handle: JoinHandle<()>,
    status_rx: watch::Receiver<DrainStatus>,
    cancel_tx: watch::Sender<bool>,
}

pub struct DrainCoordinator {
    runtime: Handle,
    control: Arc<dyn ClusterControl>,
    storage: Arc<dyn StorageContent>,
    /// Tracked workers: cache pool → slot.
    slots: HashMap<String, DrainSlot>,
}

impl DrainCoordinator {
    /// Workers are spawned as blocking tasks on `runtime`.
    pub fn new(
        runtime: Handle,
        control: Arc<dyn ClusterControl>,
        storage: Arc<dyn StorageContent>,
    ) -> Self {
        Self {
            runtime,
            control,
            storage,
            slots: HashMap::new(),
        }
    }

    /// Launch a drain for `cache_pool`. No-op returning false if a worker
    /// for that pool is still running. A finished worker is replaced.
    pub fn start(&mut self, cache_pool: &str) -> bool {
        if self.is_running(cache_pool) {
            debug!(%cache_pool, "drain already running");
            return false;
        }

        let (status_tx, status_rx) = watch::channel(DrainStatus::Running);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let control = self.control.clone();
        let storage = self.storage.clone();
        let pool = cache_pool.to_string();

        let handle = self.runtime.spawn_blocking(move || {
            let status = run_drain(&pool, control.as_ref(), storage.as_ref(), &cancel_rx);
            match &status {
                DrainStatus::Completed => info!(cache_pool = %pool, "drain completed"),
                DrainStatus::Failed(e) => warn!(cache_pool = %pool, error = %e, "drain failed"),
                DrainStatus::Cancelled => info!(cache_pool = %pool, "drain cancelled"),
                DrainStatus::Running => {}
            }
            let _ = status_tx.send(status);
        });

        self.slots.insert(
            cache_pool.to_string(),
            DrainSlot {
                handle,
                status_rx,
                cancel_tx,
            },
        );
        info!(%cache_pool, "drain worker started");
        true
    }

    /// Current status, or `None` when no worker is tracked for the pool.
    pub fn status(&self, cache_pool: &str) -> Option<DrainStatus> {
        let slot = self.slots.get(cache_pool)?;
        let status = slot.status_rx.borrow().clone();
        if status == DrainStatus::Running && slot.handle.is_finished() {
            // The worker ended without reporting, i.e. it panicked.
            return Some(DrainStatus::Failed("drain worker exited unexpectedly".to_string()));
        }
        Some(status)
    }

    pub fn is_running(&self, cache_pool: &str) -> bool {
        self.status(cache_pool) == Some(DrainStatus::Running)
    }

    /// True once the tracked worker has finished, successfully or not.
    pub fn is_done(&self, cache_pool: &str) -> bool {
        self.status(cache_pool).is_some_and(|s| s.is_done())
    }

    /// Stop tracking a pool's worker. A running worker keeps going.
    pub fn forget(&mut self, cache_pool: &str) {
        self.slots.remove(cache_pool);
    }

    /// Pools with a tracked worker.
    pub fn tracked(&self) -> Vec<String> {
        let mut pools: Vec<String> = self.slots.keys().cloned().collect();
        pools.sort();
        pools
    }

    /// Signal every worker to stop at its next phase boundary. Workers are
    /// not awaited; a drain blocked in flush finishes on its own.
    pub fn shutdown(&mut self) {
        for (pool, slot) in self.slots.drain() {
            let _ = slot.cancel_tx.send(true);
            debug!(cache_pool = %pool, "drain worker signalled to stop");
        }
        info!("drain coordinator shut down");
    }
}

fn run_drain(
    pool: &str,
    control: &dyn ClusterControl,
    storage: &dyn StorageContent,
    cancel: &watch::Receiver<bool>,
) -> DrainStatus {
    if *cancel.borrow() {
        return DrainStatus::Cancelled;
    }

    let forward = ClusterCommand::TierCacheMode {
        pool: pool.to_string(),
        mode: CacheMode::Forward,
        force: true,
    };
    match control.execute(&forward) {
        Ok(out) if out.is_success() => {}
        Ok(out) => {
            return DrainStatus::Failed(format!(
                "cache-mode forward: status {}: {}",
                out.status, out.stderr
            ));
        }
        Err(e) => return DrainStatus::Failed(format!("cache-mode forward: {e}")),
    }

    if *cancel.borrow() {
        return DrainStatus::Cancelled;
    }

    match storage.flush_evict_all(pool) {
        Ok(()) => DrainStatus::Completed,
        Err(e) => DrainStatus::Failed(format!("flush-evict-all: {e}")),
    }
}
