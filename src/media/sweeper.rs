//! Background eviction of expired ephemeral images

use crate::media::cache::{MediaCache, SweepOutcome};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodic sweep task over a [`MediaCache`]
pub struct CacheSweeper {
    cache: Arc<MediaCache>,
    interval: Duration,
    running: Arc<RwLock<bool>>,
    shutdown: Arc<Notify>,
    worker: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl CacheSweeper {
    pub fn new(cache: Arc<MediaCache>, interval: Duration) -> Self {
        Self {
            cache,
            interval,
            running: Arc::new(RwLock::new(false)),
            shutdown: Arc::new(Notify::new()),
            worker: RwLock::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Spawn the sweep task; a second call while running is a no-op
    pub fn start(&self) {
        let mut running = self.running.write();
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let cache = Arc::clone(&self.cache);
        let running = Arc::clone(&self.running);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            Self::sweep_loop(cache, interval, running, shutdown).await;
        });
        *self.worker.write() = Some(handle);

        info!(interval_ms = interval.as_millis() as u64, "Started cache sweeper");
    }

    /// Stop the sweep task, waiting for an in-progress sweep to finish
    pub async fn stop(&self) {
        let mut running = self.running.write();
        if !*running {
            return;
        }
        *running = false;
        drop(running);

        self.shutdown.notify_one();
        let handle = self.worker.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Stopped cache sweeper");
    }

    async fn sweep_loop(
        cache: Arc<MediaCache>,
        interval: Duration,
        running: Arc<RwLock<bool>>,
        shutdown: Arc<Notify>,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // A tick that lands while a sweep is running is dropped, not queued.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;

        while *running.read() {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.notified() => break,
            }

            match cache.sweep_expired().await {
                Ok(SweepOutcome::Completed(report)) => {
                    debug!(scanned = report.scanned, removed = report.removed, "Sweep tick");
                }
                Ok(SweepOutcome::Skipped) => debug!("Sweep tick skipped"),
                Err(e) => warn!(error = %e, "Cache sweep failed"),
            }
        }
    }
}
