//! Caller-side observation of a job's outcome.
//!
//! The HTTP layer answers its client as soon as a job is accepted; the
//! outcome is only ever logged. [`spawn_monitor`] starts one independent task
//! per accepted job that waits for the result, bounded by a ceiling and by a
//! parent cancellation token.

use crate::job::JobReceipt;
use core::{fmt, time::Duration};
use tokio::{task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a monitored job ended, from the observer's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// The document was rendered.
    Completed,
    /// The job failed: renderer error, no worker available, or pool stopped.
    Failed,
    /// The render was cancelled or ran past its deadline.
    Cancelled,
    /// The result channel closed without an outcome.
    Dropped,
    /// No outcome arrived before the monitor's ceiling.
    TimedOut,
    /// The parent token was cancelled first.
    Aborted,
}

impl MonitorOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Dropped => "dropped",
            Self::TimedOut => "timed_out",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for MonitorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spawns an observer for `receipt` bound to a child of `parent`.
pub fn spawn_monitor(
    receipt: JobReceipt,
    ceiling: Duration,
    parent: &CancellationToken,
) -> JoinHandle<MonitorOutcome> {
    tokio::spawn(watch(receipt, ceiling, parent.child_token()))
}

/// Waits for the outcome of `receipt` and logs it.
///
/// Resolves after the outcome arrives, after `ceiling` elapses, or when
/// `token` is cancelled, whichever comes first.
pub async fn watch(
    mut receipt: JobReceipt,
    ceiling: Duration,
    token: CancellationToken,
) -> MonitorOutcome {
    let job_id = receipt.job_id();
    let document_id = receipt.document_id().clone();

    tokio::select! {
        biased;
        outcome = timeout(ceiling, receipt.wait()) => match outcome {
            Ok(Some(Ok(()))) => {
                info!(%job_id, %document_id, "Document generation completed");
                MonitorOutcome::Completed
            }
            Ok(Some(Err(e))) if e.is_cancellation() => {
                warn!(%job_id, %document_id, "Document generation cancelled: {e}");
                MonitorOutcome::Cancelled
            }
            Ok(Some(Err(e))) => {
                error!(%job_id, %document_id, "Document generation failed: {e}");
                MonitorOutcome::Failed
            }
            Ok(None) => {
                warn!(%job_id, %document_id, "Result channel closed without an outcome");
                MonitorOutcome::Dropped
            }
            Err(_) => {
                warn!(%job_id, %document_id, ?ceiling, "Timed out waiting for document generation");
                MonitorOutcome::TimedOut
            }
        },
        () = token.cancelled() => {
            debug!(%job_id, %document_id, "Monitor cancelled");
            MonitorOutcome::Aborted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        PoolConfig, RenderContext, RenderError, RenderPool, job::DocumentId, pool::tests::render_fn,
    };

    async fn outcome_for<F, Fut>(renderer: F, ceiling: Duration) -> MonitorOutcome
    where
        F: Fn(RenderContext, DocumentId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RenderError>> + Send,
    {
        let pool = RenderPool::new(
            PoolConfig::new(1, 4).with_render_timeout(Duration::from_millis(100)),
            renderer,
        );
        pool.start();

        let receipt = pool.submit("doc", "monitor-tests").await.unwrap();
        let outcome = spawn_monitor(receipt, ceiling, &CancellationToken::new())
            .await
            .unwrap();

        pool.stop().await;
        outcome
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn classifies_success() {
        let outcome = outcome_for(|_, _| async { Ok(()) }, Duration::from_secs(5)).await;
        assert_eq!(outcome, MonitorOutcome::Completed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn classifies_failure() {
        let outcome = outcome_for(
            |_, _| async { Err(RenderError::failed("template missing")) },
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome, MonitorOutcome::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn classifies_deadline_as_cancelled() {
        let outcome = outcome_for(
            |_, _| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome, MonitorOutcome::Cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn times_out_before_slow_render() {
        let renderer = render_fn(|_, _| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        });
        let pool = RenderPool::new(PoolConfig::new(1, 4), renderer);
        pool.start();

        let receipt = pool.submit("doc", "monitor-tests").await.unwrap();
        let outcome = spawn_monitor(receipt, Duration::from_millis(20), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, MonitorOutcome::TimedOut);

        pool.stop().await;
        assert_eq!(pool.completed_jobs(), 1);
        assert_eq!(pool.lost_results(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parent_cancellation_aborts() {
        let renderer = render_fn(|_, _| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        let pool = RenderPool::new(PoolConfig::new(1, 4), renderer);
        pool.start();

        let parent = CancellationToken::new();
        let receipt = pool.submit("doc", "monitor-tests").await.unwrap();
        let handle = spawn_monitor(receipt, Duration::from_secs(5), &parent);
        parent.cancel();

        assert_eq!(handle.await.unwrap(), MonitorOutcome::Aborted);
        pool.stop().await;
    }
}
