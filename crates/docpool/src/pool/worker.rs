use super::{Inbox, manager::Shared};
use crate::{
    Error,
    job::{DocumentId, Job},
    render::{RenderContext, RenderError, Renderer},
};
use core::{any::Any, panic::AssertUnwindSafe};
use futures::FutureExt;
use std::sync::Arc;
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, error, info, instrument, trace, warn};

/// Worker task responsible for rendering one [`Job`] at a time.
///
/// Each worker owns a private inbox. Whenever it is idle it registers that
/// inbox in the shared ready-pool and waits for the dispatcher to hand it a
/// job. The loop ends on the pool's shutdown signal; a job that already sits
/// in the inbox is still rendered before the worker exits.
///
/// # Arguments
///
/// - `worker_id`: Ordinal of this worker (used for logs/tracing).
/// - `shared`: Renderer, configuration, state and shutdown signal shared by the
///   pool.
/// - `ready`: Sending half of the ready-pool the dispatcher acquires inboxes
///   from.
#[instrument(name = "worker", skip(shared, ready))]
pub(crate) async fn worker_loop<R: Renderer>(
    worker_id: usize,
    shared: Arc<Shared<R>>,
    ready: mpsc::Sender<Inbox>,
) {
    let _alive = shared.state.worker_alive();
    trace!(worker_id, "Worker started");

    // Capacity 1 is enough: the worker only advertises its inbox while idle,
    // so the dispatcher never has more than one job for it.
    let (inbox_tx, mut inbox_rx) = mpsc::channel::<Job>(1);

    while !shared.state.is_stopping() {
        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            registered = ready.send(inbox_tx.clone()) => {
                if registered.is_err() {
                    debug!(worker_id, "Ready pool closed");
                    break;
                }
            }
        }

        // A job that already reached the inbox wins over shutdown.
        let job = tokio::select! {
            biased;
            job = inbox_rx.recv() => job,
            () = shared.shutdown.cancelled() => None,
        };

        let Some(job) = job else {
            break;
        };

        process_job(worker_id, &shared, job).await;
    }

    // Anything handed off after we stopped listening is rejected rather than
    // silently dropped.
    inbox_rx.close();
    while let Ok(job) = inbox_rx.try_recv() {
        debug!(worker_id, job_id = %job.id(), "Rejecting job received during shutdown");
        if !job.try_resolve(Err(Error::PoolStopped)) {
            shared.state.record_lost();
        }
    }

    debug!(worker_id, "Worker stopped");
}

/// Renders a single job and delivers its outcome.
#[instrument(
    name = "render_job",
    level = "debug",
    skip_all,
    fields(job_id = %job.id(), document_id = %job.document_id())
)]
async fn process_job<R: Renderer>(worker_id: usize, shared: &Shared<R>, job: Job) {
    let job_id = job.id();
    let document_id = job.document_id().clone();
    let started = Instant::now();

    let outcome = {
        let _busy = shared.state.job_active();
        let ctx = RenderContext::new(job_id, job.submitter(), shared.config.render_timeout);
        // A panicking renderer fails its job; the worker keeps serving.
        AssertUnwindSafe(render_bounded(&shared.renderer, ctx, document_id.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(RenderError::failed(format!(
                    "renderer panicked: {}",
                    panic_message(&*panic)
                )))
            })
    };
    let elapsed = started.elapsed();

    match &outcome {
        Ok(()) => {
            shared.state.record_completed();
            info!(worker_id, %job_id, %document_id, ?elapsed, "Document rendered");
        }
        Err(e) if e.is_cancellation() => {
            shared.state.record_failed();
            warn!(worker_id, %job_id, %document_id, ?elapsed, "Render cancelled: {e}");
        }
        Err(e) => {
            shared.state.record_failed();
            error!(worker_id, %job_id, %document_id, ?elapsed, "Render failed: {e}");
        }
    }

    if let Err(e) = job
        .resolve(outcome.map_err(Error::from), shared.config.result_timeout)
        .await
    {
        shared.state.record_lost();
        match e {
            Error::ReceiptDropped => {
                debug!(worker_id, %job_id, %document_id, "Receipt gone, discarding result");
            }
            e => warn!(worker_id, %job_id, %document_id, "Dropping result: {e}"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string payload"
    }
}

/// Runs the renderer until it returns or the context deadline passes.
///
/// On expiry the context is cancelled and the render future dropped.
async fn render_bounded<R: Renderer>(
    renderer: &R,
    ctx: RenderContext,
    document_id: DocumentId,
) -> Result<(), RenderError> {
    let deadline = ctx.deadline();
    let budget = ctx.budget();
    let handle = ctx.clone();

    tokio::select! {
        result = renderer.render(ctx, document_id) => result,
        () = tokio::time::sleep_until(deadline) => {
            handle.cancel();
            Err(RenderError::DeadlineExceeded(budget))
        }
    }
}
