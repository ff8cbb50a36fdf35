use core::time::Duration;

/// Default number of persistent workers.
pub const DEFAULT_NUM_WORKERS: usize = 2;
/// Default capacity of the bounded job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// How long `submit` waits for queue space before returning `QueueFull`.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(30);
/// How long the dispatcher waits for a worker to become ready.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the dispatcher waits for a ready worker to accept a job.
pub const DEFAULT_HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the dispatcher waits to report a dispatch failure.
pub const DEFAULT_REPORT_TIMEOUT: Duration = Duration::from_secs(5);
/// Render budget per job.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// How long a worker waits to deliver an outcome.
pub const DEFAULT_RESULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sizing and timeout settings for a [`RenderPool`](crate::RenderPool).
///
/// Every wait in the pool is bounded by one of these values; none of them is
/// allowed to block forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of persistent workers spawned at start.
    pub num_workers: usize,

    /// Capacity of the bounded job queue. This is the only throttle on
    /// submissions.
    pub queue_capacity: usize,

    /// Maximum time `submit` waits for queue space.
    pub submit_timeout: Duration,

    /// Maximum time the dispatcher waits for a ready worker.
    pub acquire_timeout: Duration,

    /// Maximum time the dispatcher waits for a worker to accept a job.
    pub handoff_timeout: Duration,

    /// Maximum time the dispatcher waits to write a dispatch failure.
    pub report_timeout: Duration,

    /// Render budget for a single job.
    pub render_timeout: Duration,

    /// Maximum time a worker waits to deliver an outcome.
    pub result_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_workers: DEFAULT_NUM_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            handoff_timeout: DEFAULT_HANDOFF_TIMEOUT,
            report_timeout: DEFAULT_REPORT_TIMEOUT,
            render_timeout: DEFAULT_RENDER_TIMEOUT,
            result_timeout: DEFAULT_RESULT_TIMEOUT,
        }
    }
}

impl PoolConfig {
    pub fn new(num_workers: usize, queue_capacity: usize) -> Self {
        Self::default()
            .with_num_workers(num_workers)
            .with_queue_capacity(queue_capacity)
    }

    /// Sets the worker count (at least 1).
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers.max(1);
        self
    }

    /// Sets the queue capacity (at least 1).
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity.max(1);
        self
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_handoff_timeout(mut self, timeout: Duration) -> Self {
        self.handoff_timeout = timeout;
        self
    }

    pub fn with_report_timeout(mut self, timeout: Duration) -> Self {
        self.report_timeout = timeout;
        self
    }

    pub fn with_render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn with_result_timeout(mut self, timeout: Duration) -> Self {
        self.result_timeout = timeout;
        self
    }
}
