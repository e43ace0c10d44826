//! Worker thread implementation

use crate::core::error::panic_message;
use crate::core::{BoxedJob, JobError, Result};
use crate::queue::{ThreadSafeQueue, TryPop};
use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{span, Level};

thread_local! {
    // (pool id, worker index) of the pool worker running on this thread.
    static CURRENT_WORKER: Cell<Option<(u64, usize)>> = const { Cell::new(None) };
}

/// Index of the calling thread within the pool identified by `pool_id`.
pub(crate) fn current_worker(pool_id: u64) -> Option<usize> {
    CURRENT_WORKER.with(|current| match current.get() {
        Some((id, index)) if id == pool_id => Some(index),
        _ => None,
    })
}

/// Statistics for a worker thread
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total number of tasks routed to this worker's queue
    pub tasks_assigned: AtomicU64,
    /// Total number of jobs processed successfully
    pub jobs_processed: AtomicU64,
    /// Total number of jobs that returned an error
    pub jobs_failed: AtomicU64,
    /// Total number of jobs that panicked
    pub jobs_panicked: AtomicU64,
    /// Total number of queued jobs discarded by cancellation
    pub jobs_cancelled: AtomicU64,
    /// Total time spent processing jobs (microseconds)
    pub total_processing_time_us: AtomicU64,
}

impl WorkerStats {
    /// Create new worker statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total tasks assigned
    pub fn get_tasks_assigned(&self) -> u64 {
        self.tasks_assigned.load(Ordering::Relaxed)
    }

    /// Get total jobs processed
    pub fn get_jobs_processed(&self) -> u64 {
        self.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get total jobs failed
    pub fn get_jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get total jobs panicked
    pub fn get_jobs_panicked(&self) -> u64 {
        self.jobs_panicked.load(Ordering::Relaxed)
    }

    /// Get total jobs cancelled
    pub fn get_jobs_cancelled(&self) -> u64 {
        self.jobs_cancelled.load(Ordering::Relaxed)
    }

    /// Get average processing time per finished job in microseconds
    pub fn get_average_processing_time_us(&self) -> f64 {
        let total = self.total_processing_time_us.load(Ordering::Relaxed);
        let count = self.get_jobs_processed() + self.get_jobs_failed() + self.get_jobs_panicked();
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    fn record(&self, outcome: &JobOutcome) {
        let counter = match outcome.kind {
            OutcomeKind::Completed => &self.jobs_processed,
            OutcomeKind::Failed => &self.jobs_failed,
            OutcomeKind::Panicked => &self.jobs_panicked,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.total_processing_time_us
            .fetch_add(outcome.elapsed.as_micros() as u64, Ordering::Relaxed);
    }
}

/// State shared by every worker of one pool.
#[derive(Debug)]
pub(crate) struct PoolShared {
    pub(crate) id: u64,
    pub(crate) alive: AtomicBool,
    pub(crate) failures: ThreadSafeQueue<String>,
}

impl PoolShared {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            alive: AtomicBool::new(true),
            failures: ThreadSafeQueue::new(),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// State shared between a worker handle and its thread.
struct WorkerShared {
    queue: ThreadSafeQueue<BoxedJob>,
    // Guards the sleep/wake handshake; the queue has its own lock.
    signal: Mutex<()>,
    wakeup: Condvar,
    busy: AtomicBool,
    stats: Arc<WorkerStats>,
}

/// One pool thread together with its private task queue
pub struct Worker {
    id: usize,
    shared: Arc<WorkerShared>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
    thread_id: thread::ThreadId,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.id)
            .field("queued", &self.shared.queue.len())
            .field("busy", &self.shared.busy.load(Ordering::Relaxed))
            .finish()
    }
}

impl Worker {
    /// Create and start a new worker
    ///
    /// # Arguments
    ///
    /// * `id` - Index of this worker within its pool
    /// * `pool` - State shared by the whole pool (liveness and failure queue)
    /// * `thread_name` - OS thread name
    /// * `poll_interval` - Upper bound on a single idle wait
    ///
    /// # Shutdown Behavior
    ///
    /// Workers exit once the pool is no longer alive and their own queue is
    /// empty, so every task queued before termination still runs.
    pub(crate) fn new(
        id: usize,
        pool: Arc<PoolShared>,
        thread_name: String,
        poll_interval: Duration,
    ) -> Result<Self> {
        let shared = Arc::new(WorkerShared {
            queue: ThreadSafeQueue::new(),
            signal: Mutex::new(()),
            wakeup: Condvar::new(),
            busy: AtomicBool::new(false),
            stats: Arc::new(WorkerStats::new()),
        });
        let shared_clone = Arc::clone(&shared);

        let thread = thread::Builder::new()
            .name(thread_name)
            .spawn(move || {
                Self::run(id, shared_clone, pool, poll_interval);
            })
            .map_err(|e| JobError::spawn(id, e.to_string()))?;

        Ok(Self {
            id,
            shared,
            thread_id: thread.thread().id(),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.shared.stats)
    }

    /// Number of tasks waiting in this worker's queue
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Not executing anything and nothing queued
    pub fn is_idle(&self) -> bool {
        !self.shared.busy.load(Ordering::Acquire) && self.shared.queue.is_empty()
    }

    /// Queue `job` and wake the worker.
    ///
    /// Hands the job back if the pool stopped accepting work, so the caller
    /// can run it itself.
    pub(crate) fn enqueue(&self, pool: &PoolShared, job: BoxedJob) -> std::result::Result<(), BoxedJob> {
        {
            // The liveness check and the push happen under the signal lock so
            // a worker can never exit between them and strand the job.
            let _signal = self.shared.signal.lock();
            if !pool.is_alive() {
                return Err(job);
            }
            self.shared.queue.push(job);
        }
        self.shared.stats.tasks_assigned.fetch_add(1, Ordering::Relaxed);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Wake the worker so it re-checks its queue and the pool state.
    pub(crate) fn nudge(&self) {
        drop(self.shared.signal.lock());
        self.shared.wakeup.notify_all();
    }

    /// Drop every queued job without running it; returns how many were dropped.
    pub(crate) fn cancel_queued(&self) -> usize {
        let cancelled = self.shared.queue.clear_all();
        self.shared
            .stats
            .jobs_cancelled
            .fetch_add(cancelled as u64, Ordering::Relaxed);
        cancelled
    }

    /// Join the worker thread
    ///
    /// The handle stays locked until the thread has exited, so a concurrent
    /// second caller returns only after the first join finished. A worker
    /// asked to join itself (the pool was dropped from one of its own tasks)
    /// is left detached and exits on its own once its queue is empty.
    pub fn join(&self) -> Result<()> {
        if thread::current().id() == self.thread_id {
            log::debug!("worker {} asked to join itself; detaching", self.id);
            return Ok(());
        }
        let mut handle = self.thread.lock();
        match handle.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| JobError::join(self.id, "Worker panicked")),
            None => Ok(()),
        }
    }

    /// Main worker loop
    ///
    /// Idle: wait on the condvar until the queue has work or the pool stops.
    /// Draining: pop and run jobs until the queue is genuinely empty.
    fn run(id: usize, worker: Arc<WorkerShared>, pool: Arc<PoolShared>, poll_interval: Duration) {
        CURRENT_WORKER.with(|current| current.set(Some((pool.id, id))));

        #[cfg(feature = "tracing")]
        let worker_span = span!(Level::DEBUG, "worker", id = id);
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        log::debug!("worker {} started", id);

        'worker: loop {
            Self::drain(id, &worker, &pool);

            let mut signal = worker.signal.lock();
            loop {
                if !worker.queue.is_empty() {
                    break;
                }
                if !pool.is_alive() {
                    break 'worker;
                }
                worker.wakeup.wait_for(&mut signal, poll_interval);
            }
        }

        log::debug!(
            "worker {} stopped: {} processed, {} failed, {} panicked",
            id,
            worker.stats.get_jobs_processed(),
            worker.stats.get_jobs_failed(),
            worker.stats.get_jobs_panicked()
        );
    }

    /// Run queued jobs until the queue reports empty.
    fn drain(id: usize, worker: &WorkerShared, pool: &PoolShared) {
        worker.busy.store(true, Ordering::Release);

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_drain_start(id, worker.queue.len());
        #[cfg(feature = "tracing")]
        let mut jobs_run = 0u64;

        let backoff = Backoff::new();
        loop {
            match worker.queue.try_pop() {
                TryPop::Popped(mut job) => {
                    backoff.reset();
                    let outcome = execute_job(&mut job, &pool.failures);
                    if let Some(message) = &outcome.failure {
                        log::warn!("worker {}: job '{}' failed: {}", id, job.job_type(), message);
                    }
                    worker.stats.record(&outcome);
                    #[cfg(feature = "tracing")]
                    {
                        jobs_run += 1;
                        crate::tracing::metrics::record_job(
                            id,
                            job.job_type(),
                            outcome.elapsed,
                            outcome.kind.as_str(),
                        );
                    }
                }
                TryPop::Empty => break,
                // Someone else holds the queue lock (a producer or a
                // cancellation); the queue may still have work.
                TryPop::Contended => backoff.snooze(),
            }
        }

        worker.busy.store(false, Ordering::Release);

        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_drain_end(id, jobs_run);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutcomeKind {
    Completed,
    Failed,
    Panicked,
}

#[cfg(feature = "tracing")]
impl OutcomeKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            OutcomeKind::Completed => "completed",
            OutcomeKind::Failed => "failed",
            OutcomeKind::Panicked => "panicked",
        }
    }
}

/// What happened when a job ran.
#[derive(Debug)]
pub(crate) struct JobOutcome {
    pub(crate) kind: OutcomeKind,
    pub(crate) elapsed: Duration,
    pub(crate) failure: Option<String>,
}

/// Execute a single job with panic protection.
///
/// Errors and panics never escape: their message is pushed onto `failures`
/// and reported in the returned outcome.
pub(crate) fn execute_job(job: &mut BoxedJob, failures: &ThreadSafeQueue<String>) -> JobOutcome {
    #[cfg(feature = "tracing")]
    let job_span = span!(Level::DEBUG, "job_execution", job_type = job.job_type());
    #[cfg(feature = "tracing")]
    let _job_guard = job_span.enter();

    let start = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| job.execute()));
    let elapsed = start.elapsed();

    let (kind, failure) = match result {
        Ok(Ok(())) => (OutcomeKind::Completed, None),
        Ok(Err(e)) => (OutcomeKind::Failed, Some(e.to_string())),
        Err(payload) => (OutcomeKind::Panicked, Some(panic_message(payload.as_ref()))),
    };

    if let Some(message) = &failure {
        failures.push(message.clone());
    }

    JobOutcome {
        kind,
        elapsed,
        failure,
    }
}
