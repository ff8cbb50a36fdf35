//! Error types for the document generation pool.
//!
//! This module defines the central `Error` enum, which captures every outcome
//! that is not a successful render. Admission errors are returned directly
//! from [`RenderPool::submit`]; everything after admission travels through the
//! job's result channel and is observability-only.
//!
//! ## Error Cases
//! - `QueueFull`: the bounded queue stayed full for the whole submission
//!   timeout.
//! - `PoolStopped`: the pool is not running, or is shutting down.
//! - `WorkerUnavailable`: the dispatcher could not acquire or hand off to a
//!   worker in time.
//! - `RenderFailure`: the renderer returned an error, including cancellation
//!   and deadline expiry.
//! - `ResultDeliveryTimeout`: an outcome could not be written to the result
//!   channel in time. Logged only; the caller never sees it.
//! - `ReceiptDropped`: the caller dropped its receipt before the outcome was
//!   written. Logged only.
//!
//! [`RenderPool::submit`]: crate::RenderPool::submit

use crate::render::RenderError;
use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the document generation pool.
#[derive(Clone, thiserror::Error, Debug)]
pub enum Error {
    /// The job queue did not free up within the submission timeout.
    #[error("Job queue is full")]
    QueueFull,

    /// The pool is not accepting work.
    #[error("Worker pool is stopped")]
    PoolStopped,

    /// No worker could take the job in time.
    #[error("No worker available: {context}")]
    WorkerUnavailable { context: String },

    /// The renderer reported an error for this job.
    #[error("Render failed: {0}")]
    RenderFailure(#[from] RenderError),

    /// The outcome could not be written to the job's result channel.
    #[error("Result delivery timed out after {0:?}")]
    ResultDeliveryTimeout(Duration),

    /// The job's receipt was dropped before the outcome could be written.
    #[error("Job receipt was dropped before the outcome was delivered")]
    ReceiptDropped,
}

impl Error {
    /// Returns `true` if the job was cut short by cancellation or by its render
    /// deadline rather than failing on its own.
    pub const fn is_cancellation(&self) -> bool {
        match self {
            Self::RenderFailure(e) => e.is_cancellation(),
            _ => false,
        }
    }

    /// Returns `true` for errors raised synchronously by
    /// [`RenderPool::submit`](crate::RenderPool::submit).
    pub const fn is_admission(&self) -> bool {
        matches!(self, Self::QueueFull | Self::PoolStopped)
    }
}
