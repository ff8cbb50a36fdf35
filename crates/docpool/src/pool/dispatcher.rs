//! The single coordination loop between the job queue and the workers.
//!
//! Jobs leave the queue in FIFO order. For each one the dispatcher acquires
//! whichever worker inbox becomes ready first and hands the job over; every
//! wait is bounded, and a job that cannot be placed is resolved with
//! [`Error::WorkerUnavailable`] instead of being retried.

use super::{Inbox, manager::Shared};
use crate::{Error, job::Job, render::Renderer};
use std::sync::Arc;
use tokio::{
    sync::mpsc::{self, error::SendTimeoutError},
    time::timeout,
};
use tracing::{debug, trace, warn};

pub(crate) async fn dispatch_loop<R: Renderer>(
    shared: Arc<Shared<R>>,
    mut queue: mpsc::Receiver<Job>,
    mut ready: mpsc::Receiver<Inbox>,
) {
    debug!("Dispatcher started");

    loop {
        if shared.state.is_stopping() {
            break;
        }

        let job = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            job = queue.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        dispatch(&shared, &mut ready, job).await;
    }

    drain_queue(&shared, &mut queue);
    debug!("Dispatcher stopped");
}

/// Places one job on a ready worker, or reports why it could not.
async fn dispatch<R: Renderer>(shared: &Shared<R>, ready: &mut mpsc::Receiver<Inbox>, job: Job) {
    let config = &shared.config;

    let acquired = tokio::select! {
        biased;
        () = shared.shutdown.cancelled() => Err(Error::PoolStopped),
        inbox = timeout(config.acquire_timeout, ready.recv()) => match inbox {
            Ok(Some(inbox)) => Ok(inbox),
            Ok(None) => Err(Error::WorkerUnavailable {
                context: "ready pool closed".to_string(),
            }),
            Err(_) => Err(Error::WorkerUnavailable {
                context: format!("no worker became ready within {:?}", config.acquire_timeout),
            }),
        },
    };

    let inbox = match acquired {
        Ok(inbox) => inbox,
        Err(e) => return reject(shared, job, e).await,
    };

    let job_id = job.id();
    match inbox.send_timeout(job, config.handoff_timeout).await {
        Ok(()) => trace!(%job_id, "Job handed to worker"),
        Err(SendTimeoutError::Timeout(job)) => {
            let error = Error::WorkerUnavailable {
                context: format!(
                    "worker did not accept job within {:?}",
                    config.handoff_timeout
                ),
            };
            reject(shared, job, error).await;
        }
        Err(SendTimeoutError::Closed(job)) => {
            let error = Error::WorkerUnavailable {
                context: "worker inbox closed".to_string(),
            };
            reject(shared, job, error).await;
        }
    }
}

/// Resolves a job the dispatcher could not place.
async fn reject<R: Renderer>(shared: &Shared<R>, job: Job, error: Error) {
    let job_id = job.id();
    let document_id = job.document_id().clone();

    if matches!(error, Error::WorkerUnavailable { .. }) {
        shared.state.record_dispatch_failure();
    }
    warn!(%job_id, %document_id, "Dispatch failed: {error}");

    if let Err(e) = job.resolve(Err(error), shared.config.report_timeout).await {
        shared.state.record_lost();
        match e {
            Error::ReceiptDropped => {
                debug!(%job_id, %document_id, "Receipt gone, discarding dispatch failure");
            }
            e => warn!(%job_id, %document_id, "Dropping dispatch failure: {e}"),
        }
    }
}

/// Resolves every job still queued at shutdown with [`Error::PoolStopped`].
fn drain_queue<R: Renderer>(shared: &Shared<R>, queue: &mut mpsc::Receiver<Job>) {
    queue.close();

    let mut abandoned = 0_usize;
    while let Ok(job) = queue.try_recv() {
        abandoned += 1;
        if !job.try_resolve(Err(Error::PoolStopped)) {
            shared.state.record_lost();
        }
    }

    if abandoned > 0 {
        warn!(abandoned, "Abandoned queued jobs on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        PoolConfig,
        job::{DocumentId, JobId, JobReceipt},
        pool::{state::PoolState, tests::render_fn},
    };
    use core::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn shared(config: PoolConfig) -> Shared<impl Renderer> {
        Shared {
            config,
            renderer: render_fn(|_, _| async { Ok(()) }),
            state: PoolState::default(),
            shutdown: CancellationToken::new(),
        }
    }

    fn job(raw: u64) -> (Job, JobReceipt) {
        Job::new(JobId::new(raw), DocumentId::from("doc"), "tests".into())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn closed_inbox_yields_worker_unavailable() {
        let shared = shared(PoolConfig::new(1, 1));
        let (ready_tx, mut ready_rx) = mpsc::channel(1);

        // A worker that advertised itself and then went away.
        let (inbox, inbox_rx) = mpsc::channel(1);
        drop(inbox_rx);
        ready_tx.send(inbox).await.unwrap();

        let (job, mut receipt) = job(1);
        dispatch(&shared, &mut ready_rx, job).await;

        match receipt.wait().await {
            Some(Err(Error::WorkerUnavailable { context })) => {
                assert_eq!(context, "worker inbox closed");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(shared.state.snapshot(0, 1, 1).dispatch_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn full_inbox_times_out_handoff() {
        let shared =
            shared(PoolConfig::new(1, 1).with_handoff_timeout(Duration::from_millis(20)));
        let (ready_tx, mut ready_rx) = mpsc::channel(1);

        let (inbox, _inbox_rx) = mpsc::channel(1);
        let (occupying, _occupying_receipt) = job(1);
        inbox.try_send(occupying).unwrap();
        ready_tx.send(inbox).await.unwrap();

        let (job, mut receipt) = job(2);
        dispatch(&shared, &mut ready_rx, job).await;

        assert!(matches!(
            receipt.wait().await,
            Some(Err(Error::WorkerUnavailable { .. }))
        ));
        assert_eq!(shared.state.snapshot(0, 1, 1).dispatch_failures, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drain_rejects_queued_jobs() {
        let shared = shared(PoolConfig::new(1, 4));
        let (queue_tx, mut queue_rx) = mpsc::channel(4);

        let (first, mut first_receipt) = job(1);
        let (second, second_receipt) = job(2);
        queue_tx.send(first).await.unwrap();
        queue_tx.send(second).await.unwrap();
        drop(second_receipt);

        drain_queue(&shared, &mut queue_rx);

        assert!(matches!(
            first_receipt.wait().await,
            Some(Err(Error::PoolStopped))
        ));
        assert_eq!(shared.state.lost_results(), 1);
    }
}
