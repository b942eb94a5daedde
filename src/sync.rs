//! Plan sync controller
//!
//! Polls the AI plan client on a fixed interval, keeps at most one request in
//! flight, and folds the results into the dashboard's plan history.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::ai::PlanClient;
use crate::models::Core;

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(45);

/// Sync loop configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Syncing,
}

/// What a trigger did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Another cycle was already in flight
    Skipped,
    /// The cycle finished and its plans (possibly none) were applied
    Completed { new_plans: usize, fallback: bool },
    /// The loop was torn down before the cycle finished; its result was dropped
    Discarded,
}

struct SyncInner {
    core: Core,
    client: PlanClient,
    state: Mutex<SyncState>,
    generation: AtomicU64,
}

/// Owns the Idle/Syncing state machine for the thinking feed
#[derive(Clone)]
pub struct PlanSync {
    inner: Arc<SyncInner>,
}

// Returns the controller to Idle however the cycle ends
struct SyncingGuard<'a> {
    state: &'a Mutex<SyncState>,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = SyncState::Idle;
    }
}

fn lock(state: &Mutex<SyncState>) -> std::sync::MutexGuard<'_, SyncState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl PlanSync {
    pub fn new(core: Core, client: PlanClient) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                core,
                client,
                state: Mutex::new(SyncState::Idle),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SyncState {
        *lock(&self.inner.state)
    }

    fn try_enter(&self) -> Option<SyncingGuard<'_>> {
        let mut state = lock(&self.inner.state);
        if *state == SyncState::Syncing {
            return None;
        }
        *state = SyncState::Syncing;
        Some(SyncingGuard {
            state: &self.inner.state,
        })
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Runs one sync cycle now unless one is already in flight
    pub async fn trigger(&self) -> SyncOutcome {
        self.run_cycle(self.generation()).await
    }

    async fn run_cycle(&self, generation: u64) -> SyncOutcome {
        if generation != self.generation() {
            return SyncOutcome::Discarded;
        }
        let Some(_guard) = self.try_enter() else {
            tracing::debug!("sync already in flight; ignoring trigger");
            return SyncOutcome::Skipped;
        };

        let (tasks, files) = self.inner.core.begin_sync();
        let batch = self.inner.client.request_plans(&tasks, &files).await;

        if generation != self.generation() {
            tracing::info!("sync loop stopped during request; discarding result");
            self.inner.core.end_sync();
            return SyncOutcome::Discarded;
        }

        let fallback = batch.is_fallback();
        let new_plans = self.inner.core.finish_sync(batch.into_plans());
        tracing::info!(new_plans, fallback, "sync cycle complete");
        SyncOutcome::Completed {
            new_plans,
            fallback,
        }
    }

    /// Starts the periodic loop. The first tick fires immediately.
    ///
    /// Ticks never wait on a slow cycle: each one spawns a cycle and the
    /// Idle/Syncing guard drops overlapping ones. The loop lives as long as
    /// the returned handle.
    pub fn start(&self, config: SyncConfig) -> SyncHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let sync = self.clone();
        let generation = self.generation();

        tracing::info!(
            interval_secs = config.interval.as_secs(),
            "plan sync loop started"
        );
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        tracing::info!("plan sync loop received shutdown signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let sync = sync.clone();
                        tokio::spawn(async move {
                            sync.run_cycle(generation).await;
                        });
                    }
                }
            }
        });

        SyncHandle {
            sync: self.clone(),
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scope of a running sync loop. Dropping it stops the timer and makes any
/// in-flight cycle discard its result.
pub struct SyncHandle {
    sync: PlanSync,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Stops the loop and waits for the timer task to exit
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn stop(&mut self) {
        if self.task.is_some() {
            self.sync.invalidate();
            let _ = self.shutdown.send(true);
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
