//! Running-state flags and job statistics.
//!
//! The two lifecycle flags sit behind a single reader/writer lock. Every
//! counter is its own atomic so status polling never contends with workers.

use parking_lot::RwLock;
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};
use serde::Serialize;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lifecycle {
    pub(crate) is_running: bool,
    pub(crate) is_stopping: bool,
}

#[derive(Debug, Default)]
pub(crate) struct PoolState {
    pub(crate) lifecycle: RwLock<Lifecycle>,
    active_workers: AtomicUsize,
    active_jobs: AtomicUsize,
    completed_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    submitted_jobs: AtomicU64,
    rejected_jobs: AtomicU64,
    dispatch_failures: AtomicU64,
    lost_results: AtomicU64,
}

impl PoolState {
    pub(crate) fn is_running(&self) -> bool {
        self.lifecycle.read().is_running
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.lifecycle.read().is_stopping
    }

    /// Running and not stopping.
    pub(crate) fn is_accepting(&self) -> bool {
        let lifecycle = self.lifecycle.read();
        lifecycle.is_running && !lifecycle.is_stopping
    }

    /// Counts a live worker until the guard drops.
    pub(crate) fn worker_alive(&self) -> CountGuard<'_> {
        CountGuard::new(&self.active_workers)
    }

    /// Counts a job in the renderer until the guard drops.
    pub(crate) fn job_active(&self) -> CountGuard<'_> {
        CountGuard::new(&self.active_jobs)
    }

    pub(crate) fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Acquire)
    }

    pub(crate) fn active_jobs(&self) -> usize {
        self.active_jobs.load(Ordering::Acquire)
    }

    pub(crate) fn completed_jobs(&self) -> u64 {
        self.completed_jobs.load(Ordering::Relaxed)
    }

    pub(crate) fn failed_jobs(&self) -> u64 {
        self.failed_jobs.load(Ordering::Relaxed)
    }

    pub(crate) fn lost_results(&self) -> u64 {
        self.lost_results.load(Ordering::Relaxed)
    }

    pub(crate) fn record_completed(&self) {
        self.completed_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lost(&self) {
        self.lost_results.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        queue_size: usize,
        queue_capacity: usize,
        total_workers: usize,
    ) -> PoolStatus {
        PoolStatus {
            is_running: self.is_running(),
            queue_size,
            queue_capacity,
            active_workers: self.active_workers(),
            total_workers,
            active_jobs: self.active_jobs(),
            completed_jobs: self.completed_jobs(),
            failed_jobs: self.failed_jobs(),
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
            rejected_jobs: self.rejected_jobs.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            lost_results: self.lost_results(),
        }
    }
}

/// Increments a gauge on creation and decrements it on drop, so a panicking
/// renderer cannot leak a count.
pub(crate) struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Point-in-time view of the pool, safe to poll from any task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub is_running: bool,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub active_workers: usize,
    pub total_workers: usize,
    pub active_jobs: usize,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub submitted_jobs: u64,
    pub rejected_jobs: u64,
    pub dispatch_failures: u64,
    pub lost_results: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_restore_gauges() {
        let state = PoolState::default();
        {
            let _worker = state.worker_alive();
            let _job = state.job_active();
            assert_eq!(state.active_workers(), 1);
            assert_eq!(state.active_jobs(), 1);
        }
        assert_eq!(state.active_workers(), 0);
        assert_eq!(state.active_jobs(), 0);
    }

    #[test]
    fn accepting_requires_running_and_not_stopping() {
        let state = PoolState::default();
        assert!(!state.is_accepting());

        state.lifecycle.write().is_running = true;
        assert!(state.is_accepting());

        state.lifecycle.write().is_stopping = true;
        assert!(!state.is_accepting());
    }

    #[test]
    fn snapshot_reflects_counters() {
        let state = PoolState::default();
        state.record_completed();
        state.record_failed();
        state.record_failed();
        state.record_lost();

        let status = state.snapshot(3, 10, 4);
        assert_eq!(status.queue_size, 3);
        assert_eq!(status.queue_capacity, 10);
        assert_eq!(status.total_workers, 4);
        assert_eq!(status.completed_jobs, 1);
        assert_eq!(status.failed_jobs, 2);
        assert_eq!(status.lost_results, 1);
        assert!(!status.is_running);
    }
}
