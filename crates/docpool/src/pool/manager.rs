//! Pool controller for asynchronous document generation.
//!
//! This module defines [`RenderPool`], which owns the bounded job queue, the
//! lifecycle flags and the statistics, and spawns the dispatcher plus a fixed
//! set of persistent workers on [`RenderPool::start`]. Shutdown is coordinated
//! through a shared [`CancellationToken`] observed by every task.
//!
//! Submission is pure admission control: [`RenderPool::submit`] returns as
//! soon as the job is queued (or rejected) and hands back a [`JobReceipt`]
//! for the eventual outcome.

use super::{dispatcher::dispatch_loop, state::PoolState, worker::worker_loop};
use crate::{
    Error, PoolConfig, PoolStatus, Result,
    job::{DocumentId, Job, JobId, JobReceipt},
    render::Renderer,
};
use parking_lot::Mutex;
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::{
    sync::mpsc::{self, error::SendTimeoutError},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// State shared by the controller, the dispatcher and every worker.
pub(crate) struct Shared<R> {
    pub(crate) config: PoolConfig,
    pub(crate) renderer: R,
    pub(crate) state: PoolState,
    pub(crate) shutdown: CancellationToken,
}

struct Inner<R> {
    shared: Arc<Shared<R>>,
    queue_tx: mpsc::Sender<Job>,
    // Taken by the dispatcher on first start.
    queue_rx: Mutex<Option<mpsc::Receiver<Job>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next_job_id: AtomicU64,
}

/// A bounded pool of persistent workers that render documents.
///
/// Cloning is cheap; all clones control the same pool.
///
/// # Example
///
/// ```ignore
/// let pool = RenderPool::new(PoolConfig::new(4, 64), renderer);
/// pool.start();
///
/// let receipt = pool.submit("invoice-42", "billing").await?;
/// docpool::spawn_monitor(receipt, Duration::from_secs(300), &token);
///
/// // On shutdown: waits for in-flight renders and joins every worker.
/// pool.stop().await;
/// ```
pub struct RenderPool<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for RenderPool<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Renderer> RenderPool<R> {
    /// Creates a stopped pool. Nothing is spawned until [`RenderPool::start`].
    pub fn new(config: PoolConfig, renderer: R) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));

        let shared = Shared {
            config,
            renderer,
            state: PoolState::default(),
            shutdown: CancellationToken::new(),
        };

        Self {
            inner: Arc::new(Inner {
                shared: Arc::new(shared),
                queue_tx,
                queue_rx: Mutex::new(Some(queue_rx)),
                tasks: Mutex::new(Vec::new()),
                next_job_id: AtomicU64::new(1),
            }),
        }
    }

    /// Spawns the workers and the dispatcher.
    ///
    /// Idempotent: calling it on a running pool logs a warning and does
    /// nothing. A pool that has been stopped cannot be started again.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        // Held for the whole start so a concurrent `stop` joins every task we
        // spawn here.
        let mut tasks = self.inner.tasks.lock();
        let shared = &self.inner.shared;

        let queue = {
            let mut lifecycle = shared.state.lifecycle.write();
            if lifecycle.is_running {
                warn!("Worker pool is already running");
                return;
            }
            if lifecycle.is_stopping {
                warn!("Worker pool has been stopped and cannot be restarted");
                return;
            }
            let Some(queue) = self.inner.queue_rx.lock().take() else {
                warn!("Worker pool queue already consumed");
                return;
            };
            lifecycle.is_running = true;
            lifecycle.is_stopping = false;
            queue
        };

        let num_workers = shared.config.num_workers.max(1);
        let (ready_tx, ready_rx) = mpsc::channel(num_workers);

        tasks.reserve(num_workers + 1);
        for worker_id in 0..num_workers {
            tasks.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(shared),
                ready_tx.clone(),
            )));
        }
        tasks.push(tokio::spawn(dispatch_loop(
            Arc::clone(shared),
            queue,
            ready_rx,
        )));

        info!(
            num_workers,
            queue_capacity = self.queue_capacity(),
            "Worker pool started"
        );
    }

    /// Gracefully shuts the pool down.
    ///
    /// - Flips the pool to stopping so no new job is accepted.
    /// - Cancels the shared [`CancellationToken`] observed by the dispatcher
    ///   and every worker.
    /// - Waits until the dispatcher and every worker have exited. In-flight
    ///   renders run to completion (or to their deadline) first.
    ///
    /// Calling it on a pool that is not running logs a warning and returns
    /// immediately.
    pub async fn stop(&self) {
        let shared = &self.inner.shared;
        {
            let mut lifecycle = shared.state.lifecycle.write();
            if !lifecycle.is_running || lifecycle.is_stopping {
                warn!("Worker pool is not running; ignoring stop");
                return;
            }
            lifecycle.is_stopping = true;
            lifecycle.is_running = false;
        }

        info!(
            active_jobs = shared.state.active_jobs(),
            queue_size = self.queue_size(),
            "Stopping worker pool"
        );
        shared.shutdown.cancel();

        let handles = core::mem::take(&mut *self.inner.tasks.lock());
        debug!("Waiting for {} pool tasks to exit", handles.len());

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker pool task did not exit cleanly: {e}");
            }
        }

        info!(
            completed_jobs = shared.state.completed_jobs(),
            failed_jobs = shared.state.failed_jobs(),
            "Worker pool shutdown complete"
        );
    }

    /// Queues a document for generation without waiting for it to run.
    ///
    /// # Errors
    ///
    /// - [`Error::PoolStopped`] if the pool is not running, or shuts down
    ///   while this call waits for queue space.
    /// - [`Error::QueueFull`] if the queue stays full for the configured
    ///   submission timeout.
    pub async fn submit(
        &self,
        document_id: impl Into<DocumentId>,
        submitter: impl Into<String>,
    ) -> Result<JobReceipt> {
        let shared = &self.inner.shared;
        if !shared.state.is_accepting() {
            shared.state.record_rejected();
            return Err(Error::PoolStopped);
        }

        let id = JobId::new(self.inner.next_job_id.fetch_add(1, Ordering::Relaxed));
        let submitter: String = submitter.into();
        let (job, receipt) = Job::new(id, document_id.into(), submitter.into());
        let submit_timeout = shared.config.submit_timeout;

        let queued = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => Err(Error::PoolStopped),
            sent = self.inner.queue_tx.send_timeout(job, submit_timeout) => match sent {
                Ok(()) => Ok(()),
                Err(SendTimeoutError::Timeout(_)) => Err(Error::QueueFull),
                Err(SendTimeoutError::Closed(_)) => Err(Error::PoolStopped),
            },
        };

        match queued {
            Ok(()) => {
                shared.state.record_submitted();
                debug!(job_id = %id, document_id = %receipt.document_id(), "Job queued");
                Ok(receipt)
            }
            Err(e) => {
                shared.state.record_rejected();
                warn!(job_id = %id, document_id = %receipt.document_id(), "Job rejected: {e}");
                Err(e)
            }
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.shared.config
    }

    /// Number of jobs waiting in the queue.
    pub fn queue_size(&self) -> usize {
        let tx = &self.inner.queue_tx;
        tx.max_capacity().saturating_sub(tx.capacity())
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.queue_tx.max_capacity()
    }

    /// Workers currently alive. Tracks pool lifetime, not busy/idle.
    pub fn active_workers(&self) -> usize {
        self.inner.shared.state.active_workers()
    }

    /// Configured worker count.
    pub fn total_workers(&self) -> usize {
        self.inner.shared.config.num_workers.max(1)
    }

    /// Jobs currently inside the renderer.
    pub fn active_jobs(&self) -> usize {
        self.inner.shared.state.active_jobs()
    }

    pub fn completed_jobs(&self) -> u64 {
        self.inner.shared.state.completed_jobs()
    }

    pub fn failed_jobs(&self) -> u64 {
        self.inner.shared.state.failed_jobs()
    }

    /// Outcomes that could not be delivered to their receipt.
    pub fn lost_results(&self) -> u64 {
        self.inner.shared.state.lost_results()
    }

    pub fn is_running(&self) -> bool {
        self.inner.shared.state.is_running()
    }

    /// Snapshot of every accessor above.
    pub fn status(&self) -> PoolStatus {
        self.inner.shared.state.snapshot(
            self.queue_size(),
            self.queue_capacity(),
            self.total_workers(),
        )
    }
}
