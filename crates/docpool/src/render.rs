//! The renderer capability consumed by workers.
//!
//! A [`Renderer`] performs the actual document construction and persistence.
//! The pool never looks inside it: any error is a job failure, `Ok(())` is
//! success. Each invocation receives a [`RenderContext`] carrying the job's
//! deadline and a cancellation token; renderers are expected to return
//! promptly once the token fires.

use crate::job::{DocumentId, JobId};
use core::{future::Future, time::Duration};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

// Same horizon tokio uses for unbounded sleeps.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Errors a [`Renderer`] can report.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum RenderError {
    /// The render context was cancelled before the document was finished.
    #[error("render was cancelled")]
    Cancelled,

    /// The render did not finish within its time budget.
    #[error("render exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// Any other renderer failure.
    #[error("{reason}")]
    Failed { reason: String },
}

impl RenderError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Cancellation and deadline expiry are logged apart from generic
    /// failures.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded(_))
    }
}

/// Per-invocation context handed to a [`Renderer`].
#[derive(Debug, Clone)]
pub struct RenderContext {
    job_id: JobId,
    submitter: Arc<str>,
    budget: Duration,
    deadline: Instant,
    token: CancellationToken,
}

impl RenderContext {
    /// Creates a context whose deadline is `budget` from now.
    ///
    /// Budgets too large to represent saturate to roughly thirty years.
    pub fn new(job_id: JobId, submitter: impl Into<Arc<str>>, budget: Duration) -> Self {
        let now = Instant::now();
        Self {
            job_id,
            submitter: submitter.into(),
            budget,
            deadline: now.checked_add(budget).unwrap_or_else(|| now + FAR_FUTURE),
            token: CancellationToken::new(),
        }
    }

    pub const fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Free-form context supplied by whoever submitted the job.
    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    pub const fn budget(&self) -> Duration {
        self.budget
    }

    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the deadline, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Document construction capability injected into the pool.
///
/// Implemented for any `Fn(RenderContext, DocumentId) -> Future` so a plain
/// async closure can be used as a renderer.
pub trait Renderer: Send + Sync + 'static {
    /// Builds and persists the document identified by `document_id`.
    ///
    /// # Errors
    ///
    /// Any error marks the job as failed. Implementations should return
    /// [`RenderError::Cancelled`] when `ctx` is cancelled.
    fn render(
        &self,
        ctx: RenderContext,
        document_id: DocumentId,
    ) -> impl Future<Output = Result<(), RenderError>> + Send;
}

impl<F, Fut> Renderer for F
where
    F: Fn(RenderContext, DocumentId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RenderError>> + Send,
{
    fn render(
        &self,
        ctx: RenderContext,
        document_id: DocumentId,
    ) -> impl Future<Output = Result<(), RenderError>> + Send {
        self(ctx, document_id)
    }
}
