//! Stale-claim reaper.
//!
//! A worker that dies between claim and finalize leaves its task `processing`
//! forever. The reaper returns such tasks to `pending` once their last update
//! is older than `stale_after`, so another worker can pick them up.
//!
//! `stale_after` must exceed the longest expected execution; a task reset
//! while its worker is still running gets `FinalizeError::Rejected` on finalize.
//!
//! # Flow
//!
//! 1. Every `interval`, call `TaskStore::reset_stale_claims(stale_after)`.
//! 2. Each reset row goes `processing -> pending` with `worker_id` cleared.
//! 3. Rows held by an open transaction are skipped and retried next sweep.
//! 4. A failed sweep is logged and the loop keeps going.
//!
//! The loop ends when the shutdown channel flips to `true` or its sender drops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::domain::{QueueError, TaskId};
use crate::ports::TaskStore;

pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(30);

pub struct ReaperLoop {
    store: Arc<dyn TaskStore>,
    stale_after: Duration,
    interval: Duration,
}

impl ReaperLoop {
    pub fn new(store: Arc<dyn TaskStore>, stale_after: Duration) -> Self {
        Self {
            store,
            stale_after,
            interval: DEFAULT_REAP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Reset every stale claim once.
    pub async fn sweep_once(&self) -> Result<Vec<TaskId>, QueueError> {
        let reset = self.store.reset_stale_claims(self.stale_after).await?;
        for id in &reset {
            warn!(task_id = %id, stale_after_secs = self.stale_after.as_secs(), "reset stale claim");
        }
        debug!(count = reset.len(), "reaper sweep done");
        Ok(reset)
    }

    /// Sweep every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped. Returns the number of tasks reset.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut total = 0;

        info!(
            stale_after_secs = self.stale_after.as_secs(),
            interval_secs = self.interval.as_secs(),
            "reaper started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            match self.sweep_once().await {
                Ok(reset) => total += reset.len(),
                // keep sweeping; the store may come back
                Err(err) => warn!(error = %err, "reaper sweep failed"),
            }
        }

        info!(total, "reaper stopped");
        total
    }
}
