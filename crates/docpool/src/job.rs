//! Jobs and the caller-side receipt for their outcome.
//!
//! A [`Job`] owns the sending half of a capacity-1 result channel. Whoever
//! holds the job (the dispatcher, then exactly one worker) writes at most one
//! outcome into it and then drops it, so the receiving [`JobReceipt`] observes
//! one value followed by a closed channel.

use crate::{Error, Result};
use core::{fmt, time::Duration};
use serde::{Serialize, Serializer};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

/// Opaque identifier of the document a job generates.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({:?})", &*self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Sequence number assigned at submission. Only used to correlate logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// A queued document generation request.
///
/// Not `Clone`: ownership moves from the queue to the dispatcher to a single
/// worker.
pub(crate) struct Job {
    id: JobId,
    document_id: DocumentId,
    submitter: Arc<str>,
    result: mpsc::Sender<Result<()>>,
}

impl Job {
    /// Creates a job together with the receipt its submitter keeps.
    pub(crate) fn new(
        id: JobId,
        document_id: DocumentId,
        submitter: Arc<str>,
    ) -> (Self, JobReceipt) {
        let (result, rx) = mpsc::channel(1);
        let receipt = JobReceipt {
            id,
            document_id: document_id.clone(),
            submitter: Arc::clone(&submitter),
            rx,
        };
        let job = Self {
            id,
            document_id,
            submitter,
            result,
        };
        (job, receipt)
    }

    pub(crate) const fn id(&self) -> JobId {
        self.id
    }

    pub(crate) const fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub(crate) fn submitter(&self) -> Arc<str> {
        Arc::clone(&self.submitter)
    }

    /// Writes the job's single outcome, waiting at most `wait`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResultDeliveryTimeout`] if the slot could not be
    /// written in time, or [`Error::ReceiptDropped`] if nobody is listening.
    /// The outcome is discarded either way.
    pub(crate) async fn resolve(self, outcome: Result<()>, wait: Duration) -> Result<()> {
        match self.result.send_timeout(outcome, wait).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(Error::ResultDeliveryTimeout(wait)),
            Err(SendTimeoutError::Closed(_)) => Err(Error::ReceiptDropped),
        }
    }

    /// Non-blocking variant of [`Job::resolve`] used while draining.
    pub(crate) fn try_resolve(self, outcome: Result<()>) -> bool {
        self.result.try_send(outcome).is_ok()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("document_id", &self.document_id)
            .field("submitter", &&*self.submitter)
            .finish_non_exhaustive()
    }
}

/// Caller-side handle to an accepted job's eventual outcome.
///
/// Dropping the receipt is allowed; the job still runs, and its outcome is
/// counted as lost.
#[derive(Debug)]
pub struct JobReceipt {
    id: JobId,
    document_id: DocumentId,
    submitter: Arc<str>,
    rx: mpsc::Receiver<Result<()>>,
}

impl JobReceipt {
    pub const fn job_id(&self) -> JobId {
        self.id
    }

    pub const fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    pub fn submitter(&self) -> &str {
        &self.submitter
    }

    /// Waits for the job's outcome.
    ///
    /// Returns `None` if the channel closed without an outcome (the result was
    /// dropped), or on any call after the outcome has been taken.
    pub async fn wait(&mut self) -> Option<Result<()>> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(raw: u64) -> (Job, JobReceipt) {
        Job::new(JobId::new(raw), DocumentId::from("doc"), Arc::from("tests"))
    }

    #[tokio::test]
    async fn receipt_sees_single_outcome_then_closed() {
        let (job, mut receipt) = job(1);
        assert_eq!(receipt.job_id(), JobId::new(1));
        assert_eq!(receipt.document_id().as_str(), "doc");

        job.resolve(Ok(()), Duration::from_millis(50)).await.unwrap();

        assert!(matches!(receipt.wait().await, Some(Ok(()))));
        assert!(receipt.wait().await.is_none());
    }

    #[tokio::test]
    async fn resolve_reports_dropped_receipt() {
        let (job, receipt) = job(2);
        drop(receipt);

        let err = job
            .resolve(Ok(()), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ReceiptDropped));
    }

    #[tokio::test]
    async fn resolve_times_out_on_occupied_slot() {
        let (job, _receipt) = job(4);
        job.result.try_send(Ok(())).unwrap();

        let err = job
            .resolve(Ok(()), Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ResultDeliveryTimeout(_)));
    }

    #[tokio::test]
    async fn dropped_job_closes_receipt() {
        let (job, mut receipt) = job(3);
        drop(job);
        assert!(receipt.wait().await.is_none());
    }

    #[test]
    fn ids_display() {
        assert_eq!(JobId::new(42).to_string(), "job-42");
        assert_eq!(DocumentId::from("report-7").to_string(), "report-7");
    }
}
