//! Process-wide job system facade.
//!
//! [`JobSystem`] owns one [`ThreadPool`] and turns plain closures into
//! [`JobFuture`]s. At most one instance is alive at a time: the registry
//! keeps only a weak reference, so the instance (and its worker threads) goes
//! away with its last strong holder, and the next
//! [`instantiate`](JobSystem::instantiate) builds a fresh one.
//!
//! ```rust
//! use rust_job_system::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let jobs = JobSystem::instantiate()?;
//! let sum = jobs.submit(|| 2 + 2);
//! assert_eq!(sum.wait()?, 4);
//!
//! assert!(JobSystem::has_instance());
//! JobSystem::destroy(jobs);
//! assert!(!JobSystem::has_instance());
//! # Ok(())
//! # }
//! ```

use crate::core::error::panic_message;
use crate::core::{promise, Job, JobError, JobFuture, Promise, Result};
use crate::pool::{ThreadPool, ThreadPoolConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::Duration;

static INSTANCE: Mutex<Weak<JobSystem>> = parking_lot::const_mutex(Weak::new());

/// Configuration used when a [`JobSystem`] instance is created
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSystemConfig {
    /// Number of worker threads
    pub num_threads: usize,
    /// Worker thread name prefix
    pub thread_name_prefix: String,
    /// Longest single idle wait of a worker
    pub poll_interval: Duration,
}

impl Default for JobSystemConfig {
    /// One worker per CPU, minus one for the main thread (at least one).
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get().saturating_sub(1).max(1),
            thread_name_prefix: "job".to_string(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl JobSystemConfig {
    /// Create a configuration with the given worker count
    /// (0 = one per CPU minus the main thread)
    #[must_use]
    pub fn new(num_threads: usize) -> Self {
        let defaults = Self::default();
        Self {
            num_threads: if num_threads == 0 {
                defaults.num_threads
            } else {
                num_threads
            },
            ..defaults
        }
    }

    /// Set the worker thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker poll interval
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl From<JobSystemConfig> for ThreadPoolConfig {
    fn from(config: JobSystemConfig) -> Self {
        ThreadPoolConfig {
            num_threads: config.num_threads,
            thread_name_prefix: config.thread_name_prefix,
            poll_interval: config.poll_interval,
        }
    }
}

/// The engine-wide job system
#[derive(Debug)]
pub struct JobSystem {
    pool: ThreadPool,
}

impl JobSystem {
    /// Get the live instance, creating one with the default configuration if
    /// none exists.
    pub fn instantiate() -> Result<Arc<Self>> {
        Self::instantiate_with(JobSystemConfig::default())
    }

    /// Get the live instance, creating one from `config` if none exists.
    ///
    /// `config` is ignored when an instance is already alive.
    pub fn instantiate_with(config: JobSystemConfig) -> Result<Arc<Self>> {
        let mut slot = INSTANCE.lock();
        if let Some(existing) = slot.upgrade() {
            log::debug!("job system already running; ignoring {:?}", config);
            return Ok(existing);
        }

        let pool = ThreadPool::with_config(config.into())?;
        let system = Arc::new(Self { pool });
        *slot = Arc::downgrade(&system);
        log::info!(
            "job system created with {} threads",
            system.available_thread_count()
        );
        Ok(system)
    }

    /// Get the live instance.
    ///
    /// With `create_if_missing` a fresh instance is built from the default
    /// configuration when none is alive; a construction failure is logged and
    /// reported as `None`.
    pub fn instance(create_if_missing: bool) -> Option<Arc<Self>> {
        if !create_if_missing {
            return INSTANCE.lock().upgrade();
        }
        match Self::instantiate() {
            Ok(system) => Some(system),
            Err(e) => {
                log::error!("failed to create job system: {}", e);
                None
            }
        }
    }

    /// Whether an instance is currently alive.
    pub fn has_instance() -> bool {
        INSTANCE.lock().strong_count() > 0
    }

    /// Give up a strong handle.
    ///
    /// Returns `true` when this was the last handle, in which case the pool
    /// has been terminated and its workers joined before this returns.
    pub fn destroy(this: Arc<Self>) -> bool {
        match Arc::into_inner(this) {
            Some(system) => {
                drop(system);
                true
            }
            None => false,
        }
    }

    /// Run `task` on the pool and get a future for its return value.
    ///
    /// The future resolves once the task body has returned. A panicking task
    /// resolves it with [`JobError::TaskPanicked`]; the panic message is also
    /// recorded for [`drain_exceptions`](Self::drain_exceptions).
    pub fn submit<F, R>(&self, task: F) -> JobFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, future) = promise();
        self.pool.assign_task(fulfilling(promise, task));
        future
    }

    /// Like [`submit`](Self::submit), but on worker `thread_index % count`.
    pub fn submit_to<F, R>(&self, thread_index: usize, task: F) -> JobFuture<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, future) = promise();
        self.pool.assign_task_to(thread_index, fulfilling(promise, task));
        future
    }

    /// Run a [`Job`] on the pool; the future carries the job's own result.
    pub fn submit_job<J: Job + 'static>(&self, job: J) -> JobFuture<()> {
        let (promise, future) = promise();
        self.pool.submit_job(PromisedJob {
            inner: job,
            promise: Some(promise),
        });
        future
    }

    /// Number of worker threads
    pub fn available_thread_count(&self) -> usize {
        self.pool.num_threads()
    }

    /// Whether the caller is the thread that created this instance
    pub fn is_main_thread(&self) -> bool {
        self.pool.is_main_thread()
    }

    /// Index of the calling worker thread, if it belongs to this instance
    pub fn current_worker_index(&self) -> Option<usize> {
        self.pool.current_worker_index()
    }

    /// Discard every task that has not started; their futures resolve with
    /// [`JobError::Abandoned`].
    pub fn cancel_pending(&self) -> usize {
        self.pool.cancel_tasks()
    }

    /// Take every captured failure message, oldest first
    pub fn drain_exceptions(&self) -> Vec<String> {
        self.pool.drain_exceptions()
    }

    /// Best-effort idle check, see [`ThreadPool::are_all_threads_idle`]
    pub fn are_all_threads_idle(&self) -> bool {
        self.pool.are_all_threads_idle()
    }

    /// The underlying pool
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        log::debug!("job system instance released");
    }
}

/// Wrap `task` so that it settles `promise` exactly once.
fn fulfilling<F, R>(promise: Promise<R>, task: F) -> impl FnOnce() + Send + 'static
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    move || match catch_unwind(AssertUnwindSafe(task)) {
        Ok(value) => promise.resolve(value),
        Err(payload) => {
            promise.reject(JobError::task_panicked(panic_message(payload.as_ref())));
            // Let the worker boundary record it as well.
            resume_unwind(payload);
        }
    }
}

struct PromisedJob<J: Job> {
    inner: J,
    promise: Option<Promise<()>>,
}

impl<J: Job> Job for PromisedJob<J> {
    fn execute(&mut self) -> Result<()> {
        let result = catch_unwind(AssertUnwindSafe(|| self.inner.execute()));
        let promise = self.promise.take();
        match result {
            Ok(Ok(())) => {
                if let Some(promise) = promise {
                    promise.resolve(());
                }
                Ok(())
            }
            Ok(Err(e)) => {
                if let Some(promise) = promise {
                    promise.reject(e.clone());
                }
                Err(e)
            }
            Err(payload) => {
                if let Some(promise) = promise {
                    promise.reject(JobError::task_panicked(panic_message(payload.as_ref())));
                }
                resume_unwind(payload)
            }
        }
    }

    fn job_type(&self) -> &str {
        self.inner.job_type()
    }
}
