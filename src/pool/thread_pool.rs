//! Thread pool implementation

use crate::core::{BoxedJob, Job, JobError, Result, Task};
use crate::pool::worker::{self, execute_job, PoolShared, Worker, WorkerStats};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Configuration for thread pool
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadPoolConfig {
    /// Number of worker threads
    pub num_threads: usize,
    /// Thread name prefix; workers are named `{prefix}-{index}`
    pub thread_name_prefix: String,
    /// Longest single idle wait before a worker re-checks its queue and the
    /// pool state. Wake-ups are normally explicit; this is a backstop.
    /// Default: 100ms
    pub poll_interval: Duration,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
            thread_name_prefix: "worker".to_string(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl ThreadPoolConfig {
    /// Create a new configuration with specified number of threads
    /// (0 = number of CPUs)
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: if num_threads == 0 {
                num_cpus::get()
            } else {
                num_threads
            },
            ..Default::default()
        }
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker poll interval.
    ///
    /// # Panics
    ///
    /// Panics if interval is zero.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "poll interval must be non-zero");
        self.poll_interval = interval;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.num_threads == 0 {
            return Err(JobError::invalid_config(
                "num_threads",
                "Number of threads must be greater than 0",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(JobError::invalid_config(
                "poll_interval",
                "Poll interval must be non-zero",
            ));
        }
        Ok(())
    }
}

/// A fixed-size pool of worker threads, each with its own task queue
///
/// Tasks are distributed round-robin across workers, or sent to a chosen
/// worker with [`assign_task_to`](Self::assign_task_to). Tasks on one worker
/// run in submission order; nothing is promised across workers.
///
/// # Failure capture
///
/// A task that panics, or a [`Job`] that returns an error, is caught on the
/// worker. Its message is stored for [`drain_exceptions`](Self::drain_exceptions)
/// and the worker carries on with its queue.
///
/// # Termination
///
/// [`terminate`](Self::terminate) lets every worker finish its queue and then
/// joins it. Tasks assigned after that run synchronously on the caller's
/// thread, so nothing is silently dropped.
///
/// ```rust
/// use rust_job_system::prelude::*;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// # fn main() -> Result<()> {
/// let pool = ThreadPool::with_threads(4)?;
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..10 {
///     let counter = Arc::clone(&counter);
///     pool.assign_task(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     });
/// }
///
/// pool.terminate()?;
/// assert_eq!(counter.load(Ordering::Relaxed), 10);
/// # Ok(())
/// # }
/// ```
pub struct ThreadPool {
    config: ThreadPoolConfig,
    workers: Vec<Worker>,
    shared: Arc<PoolShared>,
    next_worker: AtomicUsize,
    main_thread: ThreadId,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("config", &self.config)
            .field("alive", &self.is_alive())
            .field("workers", &self.workers)
            .finish()
    }
}

impl ThreadPool {
    /// Create a pool with one worker per CPU
    pub fn new() -> Result<Self> {
        Self::with_config(ThreadPoolConfig::default())
    }

    /// Create a pool with the given number of workers (0 = number of CPUs)
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        Self::with_config(ThreadPoolConfig::new(num_threads))
    }

    /// Create a pool with custom configuration
    ///
    /// The calling thread is recorded as the main thread and every worker is
    /// running when this returns.
    pub fn with_config(config: ThreadPoolConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(PoolShared::new(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)));

        let mut workers = Vec::with_capacity(config.num_threads);
        for id in 0..config.num_threads {
            let name = format!("{}-{}", config.thread_name_prefix, id);
            match Worker::new(id, Arc::clone(&shared), name, config.poll_interval) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    log::error!("failed to start worker {}: {}", id, e);
                    shared.alive.store(false, Ordering::Release);
                    for worker in &workers {
                        worker.nudge();
                        let _ = worker.join();
                    }
                    return Err(e);
                }
            }
        }

        log::info!(
            "thread pool '{}' started with {} workers",
            config.thread_name_prefix,
            config.num_threads
        );
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_pool_start(
            shared.id,
            config.num_threads,
            &config.thread_name_prefix,
            config.poll_interval,
        );

        Ok(Self {
            config,
            workers,
            shared,
            next_worker: AtomicUsize::new(0),
            main_thread: thread::current().id(),
        })
    }

    /// Assign a task to the next worker in round-robin order
    ///
    /// After [`terminate`](Self::terminate) the task runs on the calling
    /// thread before this returns.
    pub fn assign_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(None, Box::new(Task::new(task)));
    }

    /// Assign a task to worker `thread_index % num_threads`
    ///
    /// Tasks sent to the same worker run in the order they were assigned.
    pub fn assign_task_to<F>(&self, thread_index: usize, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.dispatch(Some(thread_index), Box::new(Task::new(task)));
    }

    /// Submit a job to the next worker in round-robin order
    pub fn submit_job<J: Job + 'static>(&self, job: J) {
        self.dispatch(None, Box::new(job));
    }

    /// Submit a job to worker `thread_index % num_threads`
    pub fn submit_job_to<J: Job + 'static>(&self, thread_index: usize, job: J) {
        self.dispatch(Some(thread_index), Box::new(job));
    }

    /// Submit a job that carries the caller's tracing span onto the worker
    pub fn submit_traced<J: Job + 'static>(&self, job: J) {
        self.submit_job(crate::tracing::TracedJob::new(job));
    }

    fn dispatch(&self, target: Option<usize>, job: BoxedJob) {
        let job = if self.shared.is_alive() {
            let count = self.workers.len();
            let index = match target {
                Some(index) => index % count,
                None => self.next_worker.fetch_add(1, Ordering::Relaxed) % count,
            };
            match self.workers[index].enqueue(&self.shared, job) {
                Ok(()) => return,
                Err(job) => job,
            }
        } else {
            job
        };

        log::debug!("pool is not alive; running '{}' on the caller thread", job.job_type());
        self.run_inline(job);
    }

    fn run_inline(&self, mut job: BoxedJob) {
        let outcome = execute_job(&mut job, &self.shared.failures);
        #[cfg(feature = "tracing")]
        crate::tracing::metrics::record_inline_job(job.job_type(), outcome.elapsed, outcome.kind.as_str());
        if let Some(message) = outcome.failure {
            log::warn!("inline job '{}' failed: {}", job.job_type(), message);
        }
    }

    /// Discard every task that has not started yet
    ///
    /// Tasks already running are not interrupted. Returns the number of
    /// tasks discarded.
    pub fn cancel_tasks(&self) -> usize {
        let cancelled: usize = self.workers.iter().map(Worker::cancel_queued).sum();
        if cancelled > 0 {
            log::debug!("cancelled {} pending tasks", cancelled);
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_cancelled(self.shared.id, cancelled);
        }
        cancelled
    }

    /// Stop the pool and join every worker
    ///
    /// 1. Marks the pool as not alive; new tasks now run on the caller thread
    /// 2. Wakes every worker
    /// 3. Waits for each worker to finish its queue and exit
    ///
    /// Calling this again, or concurrently, returns only once every worker
    /// has exited. Called from one of this pool's own workers, it stops after
    /// step 2: the workers exit on their own and are joined by the next
    /// terminate from outside the pool, or detached when the pool is dropped.
    pub fn terminate(&self) -> Result<()> {
        let was_alive = self.shared.alive.swap(false, Ordering::AcqRel);

        for worker in &self.workers {
            worker.nudge();
        }

        let mut first_error = None;
        if let Some(index) = self.current_worker_index() {
            // Two workers joining each other would never return.
            log::debug!("terminate called from worker {}; not joining", index);
        } else {
            for worker in &self.workers {
                if let Err(e) = worker.join() {
                    log::error!("{}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if was_alive {
            log::info!(
                "thread pool '{}' terminated: {} processed, {} failed, {} panicked",
                self.config.thread_name_prefix,
                self.total_jobs_processed(),
                self.total_jobs_failed(),
                self.total_jobs_panicked()
            );
            #[cfg(feature = "tracing")]
            crate::tracing::metrics::record_pool_termination(
                self.shared.id,
                self.total_jobs_processed(),
                self.total_jobs_failed(),
                self.total_jobs_panicked(),
            );
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Best-effort check that no worker is running or holding a task
    ///
    /// Any worker found busy is nudged. The answer can be stale by the time
    /// it is returned; do not use it for synchronization.
    pub fn are_all_threads_idle(&self) -> bool {
        let mut all_idle = true;
        for worker in &self.workers {
            if !worker.is_idle() {
                all_idle = false;
                worker.nudge();
            }
        }
        all_idle
    }

    /// Take every captured failure message, oldest first
    pub fn drain_exceptions(&self) -> Vec<String> {
        self.shared.failures.drain()
    }

    /// Get the number of worker threads
    pub fn num_threads(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool still queues tasks onto workers
    pub fn is_alive(&self) -> bool {
        self.shared.is_alive()
    }

    /// Whether the calling thread is the one that constructed the pool
    pub fn is_main_thread(&self) -> bool {
        thread::current().id() == self.main_thread
    }

    /// Index of the calling thread if it is one of this pool's workers
    pub fn current_worker_index(&self) -> Option<usize> {
        worker::current_worker(self.shared.id)
    }

    /// Number of tasks queued but not yet started (approximate)
    pub fn pending_tasks(&self) -> usize {
        self.workers.iter().map(Worker::queued).sum()
    }

    /// Get the configuration the pool was built with
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Get statistics for all workers
    pub fn get_stats(&self) -> Vec<Arc<WorkerStats>> {
        self.workers.iter().map(Worker::stats).collect()
    }

    /// Get total jobs processed successfully across all workers
    pub fn total_jobs_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.stats().get_jobs_processed()).sum()
    }

    /// Get total jobs failed across all workers
    pub fn total_jobs_failed(&self) -> u64 {
        self.workers.iter().map(|w| w.stats().get_jobs_failed()).sum()
    }

    /// Get total jobs panicked across all workers
    pub fn total_jobs_panicked(&self) -> u64 {
        self.workers.iter().map(|w| w.stats().get_jobs_panicked()).sum()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if let Err(e) = self.terminate() {
            log::error!(
                "failed to terminate thread pool '{}' during drop: {}",
                self.config.thread_name_prefix,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClosureJob;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;

    #[test]
    fn test_thread_pool_creation() {
        let pool = ThreadPool::new().expect("Failed to create thread pool");
        assert!(pool.is_alive());
        assert_eq!(pool.num_threads(), num_cpus::get());

        pool.terminate().expect("Failed to terminate pool");
        assert!(!pool.is_alive());
    }

    #[test]
    fn test_zero_threads_means_cpu_count() {
        assert_eq!(ThreadPoolConfig::new(0).num_threads, num_cpus::get());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ThreadPoolConfig {
            num_threads: 0,
            ..Default::default()
        };
        let result = ThreadPool::with_config(config);
        assert!(matches!(result, Err(JobError::InvalidConfig { .. })));
    }

    #[test]
    fn test_poll_interval_default() {
        let config = ThreadPoolConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    #[should_panic(expected = "poll interval must be non-zero")]
    fn test_poll_interval_zero_panics() {
        let _ = ThreadPoolConfig::new(2).with_poll_interval(Duration::ZERO);
    }

    #[test]
    fn test_config_from_json() {
        let config: ThreadPoolConfig =
            serde_json::from_str(r#"{ "num_threads": 3, "thread_name_prefix": "render" }"#)
                .expect("config should parse");
        assert_eq!(config.num_threads, 3);
        assert_eq!(config.thread_name_prefix, "render");
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_worker_threads_are_named() {
        let config = ThreadPoolConfig::new(2).with_thread_name_prefix("physics");
        let pool = ThreadPool::with_config(config).expect("Failed to create thread pool");

        let (tx, rx) = mpsc::channel();
        pool.assign_task_to(1, move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).expect("receiver alive");
        });

        let name = rx.recv_timeout(Duration::from_secs(5)).expect("task should run");
        assert_eq!(name.as_deref(), Some("physics-1"));
        pool.terminate().expect("Failed to terminate pool");
    }

    #[test]
    fn test_identity_queries() {
        let pool = Arc::new(ThreadPool::with_threads(2).expect("Failed to create thread pool"));
        assert!(pool.is_main_thread());
        assert_eq!(pool.current_worker_index(), None);

        let (tx, rx) = mpsc::channel();
        let pool_clone = Arc::clone(&pool);
        pool.assign_task_to(1, move || {
            tx.send((pool_clone.is_main_thread(), pool_clone.current_worker_index()))
                .expect("receiver alive");
        });

        let (is_main, index) = rx.recv_timeout(Duration::from_secs(5)).expect("task should run");
        assert!(!is_main);
        assert_eq!(index, Some(1));
        pool.terminate().expect("Failed to terminate pool");
    }

    #[test]
    fn test_failing_job_is_recorded() {
        let pool = ThreadPool::with_threads(2).expect("Failed to create thread pool");

        pool.submit_job(ClosureJob::with_name(
            || Err(JobError::other("shader compile error")),
            "CompileShader",
        ));
        pool.terminate().expect("Failed to terminate pool");

        assert_eq!(pool.total_jobs_failed(), 1);
        assert_eq!(pool.drain_exceptions(), vec!["shader compile error".to_string()]);
        assert!(pool.drain_exceptions().is_empty());
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let pool = ThreadPool::with_threads(2).expect("Failed to create thread pool");
        pool.terminate().expect("Failed to terminate pool");
        pool.terminate().expect("Second terminate should be a no-op");
        assert!(!pool.is_alive());
    }

    #[test]
    fn test_terminate_runs_queued_tasks() {
        let pool = ThreadPool::with_threads(1).expect("Failed to create thread pool");
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let ran = Arc::clone(&ran);
            pool.assign_task(move || {
                thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.terminate().expect("Failed to terminate pool");
        assert_eq!(ran.load(Ordering::SeqCst), 20);
        assert_eq!(pool.pending_tasks(), 0);
    }

    #[test]
    fn test_inline_execution_after_terminate() {
        let pool = ThreadPool::with_threads(2).expect("Failed to create thread pool");
        pool.terminate().expect("Failed to terminate pool");

        let caller = thread::current().id();
        let ran_on_caller = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran_on_caller);
        pool.assign_task(move || {
            flag.store(thread::current().id() == caller, Ordering::SeqCst);
        });
        assert!(ran_on_caller.load(Ordering::SeqCst));

        pool.assign_task(|| panic!("late failure"));
        assert_eq!(pool.drain_exceptions(), vec!["late failure".to_string()]);
    }

    #[test]
    fn test_idle_check_nudges_workers() {
        let pool = ThreadPool::with_threads(2).expect("Failed to create thread pool");
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();

        pool.assign_task_to(0, move || {
            started_tx.send(()).expect("receiver alive");
            let _ = release_rx.recv();
        });
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("task should start");
        assert!(!pool.are_all_threads_idle());

        release_tx.send(()).expect("task alive");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while !pool.are_all_threads_idle() {
            assert!(std::time::Instant::now() < deadline, "pool never went idle");
            thread::sleep(Duration::from_millis(5));
        }
        pool.terminate().expect("Failed to terminate pool");
    }

    #[test]
    fn test_drop_from_inside_task_does_not_deadlock() {
        let pool = Arc::new(ThreadPool::with_threads(2).expect("Failed to create thread pool"));
        let (tx, rx) = mpsc::channel();

        let holder = Arc::clone(&pool);
        drop(pool);
        // The task now owns the last handle, so the pool is dropped on a worker.
        holder.clone().assign_task_to(0, move || {
            drop(holder);
            tx.send(()).expect("receiver alive");
        });

        rx.recv_timeout(Duration::from_secs(5))
            .expect("task should finish without deadlocking");
    }
}
