//! Periodic sweep driver.
//!
//! One task per process. It sleeps for the sweep interval, runs a sweep,
//! and only then arms the next sleep, so a slow sweep pushes the next tick
//! back instead of stacking up. The cancellation token is the only way to
//! stop it; sweep outcomes never do.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::engine::ActivityEngine;
use crate::session::AdminSessions;

pub struct SweepScheduler {
    engine: Arc<ActivityEngine>,
    sessions: Option<Arc<AdminSessions>>,
}

impl SweepScheduler {
    pub fn new(engine: Arc<ActivityEngine>) -> Self {
        Self {
            engine,
            sessions: None,
        }
    }

    /// Also evict expired admin sessions on every tick.
    pub fn with_sessions(mut self, sessions: Arc<AdminSessions>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Run until `cancel` fires.
    ///
    /// The interval is re-read from the engine on every tick.
    pub async fn run(self, cancel: CancellationToken) -> u64 {
        let mut ticks = 0u64;
        loop {
            let interval = self.engine.config().sweep_interval();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            let report = self.engine.sweep().await;
            ticks += 1;
            if report.aborted {
                tracing::warn!(tick = ticks, "sweep aborted; will retry on next tick");
            }

            if let Some(sessions) = &self.sessions {
                let evicted = sessions.evict_expired(self.engine.now());
                if evicted > 0 {
                    tracing::debug!(evicted, "expired admin sessions evicted");
                }
            }
        }
        tracing::info!(ticks, "sweep scheduler stopped");
        ticks
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(self.run(cancel))
    }
}
