//! Frame job queue
//!
//! A FIFO drained by a single background worker, so at most one job is ever in flight and
//! jobs complete in submission order. Each submission gets a oneshot channel; the worker
//! resolves it exactly once with the job's result.

use crate::config::QueueConfig;
use crate::error::FrameError;
use crate::frame::resolver::FrameProcessor;
use crate::frame::{FrameJob, FrameResult, Nonce};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex, Notify};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Queue statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Jobs waiting to be processed
    pub pending: usize,
    /// Jobs currently being processed (0 or 1)
    pub processing: usize,
    /// Jobs that produced a frame or transaction payload
    pub completed: usize,
    /// Jobs that ended in failure
    pub failed: usize,
}

/// A queued job with its completion channel
struct QueuedJob {
    job: FrameJob,
    completion_tx: oneshot::Sender<FrameResult>,
}

/// Completion receiver for a job submitted without waiting
struct PendingResult {
    rx: oneshot::Receiver<FrameResult>,
    submitted_at: Instant,
}

/// Serializing job queue with per-nonce completion
pub struct FrameQueue {
    /// Pending jobs in submission order
    queue: Arc<Mutex<VecDeque<QueuedJob>>>,
    /// Completion receivers for jobs submitted without waiting
    receivers: Arc<parking_lot::Mutex<HashMap<Nonce, PendingResult>>>,
    /// Wakes the worker when a job is enqueued
    notify: Arc<Notify>,
    worker: RwLock<Option<tokio::task::JoinHandle<()>>>,
    processor: Arc<dyn FrameProcessor>,
    config: QueueConfig,
    running: Arc<RwLock<bool>>,
    stats: Arc<RwLock<QueueStats>>,
}

impl FrameQueue {
    pub fn new(processor: Arc<dyn FrameProcessor>, config: QueueConfig) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            receivers: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            notify: Arc::new(Notify::new()),
            worker: RwLock::new(None),
            processor,
            config,
            running: Arc::new(RwLock::new(false)),
            stats: Arc::new(RwLock::new(QueueStats::default())),
        }
    }

    /// Append a job and return its nonce immediately
    pub async fn submit(&self, job: FrameJob) -> Result<Nonce, FrameError> {
        let nonce = job.nonce;
        let rx = self.enqueue(job).await?;
        let mut receivers = self.receivers.lock();
        Self::prune_unclaimed(&mut receivers, self.config.result_retention());
        receivers.insert(
            nonce,
            PendingResult {
                rx,
                submitted_at: Instant::now(),
            },
        );
        Ok(nonce)
    }

    /// Drop results that finished but were never claimed within `retention`
    ///
    /// Jobs still queued or in flight are kept however old they are.
    fn prune_unclaimed(receivers: &mut HashMap<Nonce, PendingResult>, retention: Duration) {
        let before = receivers.len();
        receivers.retain(|_, pending| {
            if pending.submitted_at.elapsed() < retention {
                return true;
            }
            matches!(pending.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        });
        let pruned = before - receivers.len();
        if pruned > 0 {
            debug!(pruned, "Discarded unclaimed frame results");
        }
    }

    /// Wait for the result of a job submitted with [`FrameQueue::submit`]
    ///
    /// Each nonce's result can be awaited once; a second call reports `UnknownJob`.
    pub async fn await_result(&self, nonce: Nonce) -> Result<FrameResult, FrameError> {
        let pending = self
            .receivers
            .lock()
            .remove(&nonce)
            .ok_or_else(|| FrameError::UnknownJob(nonce.to_string()))?;
        pending.rx.await.map_err(|_| FrameError::QueueStopped)
    }

    /// Submit a job and wait for its result
    pub async fn submit_and_wait(&self, job: FrameJob) -> Result<FrameResult, FrameError> {
        let rx = self.enqueue(job).await?;
        rx.await.map_err(|_| FrameError::QueueStopped)
    }

    async fn enqueue(&self, job: FrameJob) -> Result<oneshot::Receiver<FrameResult>, FrameError> {
        let mut queue = self.queue.lock().await;

        // Check queue size limit
        if queue.len() >= self.config.max_queue_size {
            warn!(
                queue_size = queue.len(),
                max_size = self.config.max_queue_size,
                "Frame queue is full, rejecting job"
            );
            return Err(FrameError::QueueFull(queue.len()));
        }

        let (tx, rx) = oneshot::channel();
        let nonce = job.nonce;
        let method = job.method;
        queue.push_back(QueuedJob {
            job,
            completion_tx: tx,
        });
        let queue_size = queue.len();
        drop(queue);

        self.stats.write().pending += 1;
        self.notify.notify_one();

        debug!(nonce = %nonce, method = %method, queue_size, "Enqueued frame job");
        Ok(rx)
    }

    /// Start the background worker
    pub fn start(&self) {
        let mut running = self.running.write();
        if *running {
            return; // Already running
        }
        *running = true;
        drop(running);

        let queue = Arc::clone(&self.queue);
        let notify = Arc::clone(&self.notify);
        let processor = Arc::clone(&self.processor);
        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);

        let handle = tokio::spawn(async move {
            Self::worker_loop(queue, notify, processor, running, stats).await;
        });
        *self.worker.write() = Some(handle);

        info!("Started frame queue worker");
    }

    /// Stop the worker after its current job; jobs still pending are dropped
    ///
    /// Callers waiting on dropped jobs receive `QueueStopped`, also when the worker was
    /// never started.
    pub async fn stop(&self) {
        let was_running = std::mem::replace(&mut *self.running.write(), false);

        if was_running {
            self.notify.notify_one();
            let handle = self.worker.write().take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }
        }

        let dropped = {
            let mut queue = self.queue.lock().await;
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        self.stats.write().pending = 0;

        info!(dropped_jobs = dropped, "Stopped frame queue worker");
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        self.stats.read().clone()
    }

    /// Wait until the queue is empty and nothing is processing
    pub async fn wait_for_idle(&self, timeout: Option<Duration>) -> Result<(), FrameError> {
        let start = Instant::now();
        loop {
            let empty = self.queue.lock().await.is_empty();
            if empty && self.stats.read().processing == 0 {
                return Ok(());
            }

            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(FrameError::Internal(
                        "Timeout waiting for frame queue to drain".to_string(),
                    ));
                }
            }

            sleep(Duration::from_millis(10)).await;
        }
    }

    /// Worker loop: one job at a time, head first
    async fn worker_loop(
        queue: Arc<Mutex<VecDeque<QueuedJob>>>,
        notify: Arc<Notify>,
        processor: Arc<dyn FrameProcessor>,
        running: Arc<RwLock<bool>>,
        stats: Arc<RwLock<QueueStats>>,
    ) {
        debug!("Frame queue worker started");

        while *running.read() {
            // Counted as processing before the queue lock is released, so
            // `wait_for_idle` never sees an empty queue with the job unaccounted for.
            let next = {
                let mut queue_guard = queue.lock().await;
                let next = queue_guard.pop_front();
                if next.is_some() {
                    let mut stats = stats.write();
                    stats.pending = stats.pending.saturating_sub(1);
                    stats.processing += 1;
                }
                next
            };

            let Some(QueuedJob { job, completion_tx }) = next else {
                // Nothing queued; wake on enqueue, or periodically to observe shutdown
                tokio::select! {
                    _ = notify.notified() => continue,
                    _ = sleep(Duration::from_millis(100)) => continue,
                }
            };

            let result = processor.process(&job).await;

            {
                let mut stats = stats.write();
                if result.is_failure() {
                    stats.failed += 1;
                } else {
                    stats.completed += 1;
                }
            }

            if completion_tx.send(result).is_err() {
                debug!(nonce = %job.nonce, "Result for abandoned frame job discarded");
            }

            // Only idle once the result has been handed over
            {
                let mut stats = stats.write();
                stats.processing = stats.processing.saturating_sub(1);
            }
        }

        debug!("Frame queue worker stopped");
    }
}
