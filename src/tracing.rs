//! Tracing integration for observability.
//!
//! With the `tracing` feature enabled, workers run inside a `worker` span,
//! every job inside a `job_execution` span, and the [`metrics`] helpers emit
//! counter/gauge style events. Lifecycle and failure messages always go
//! through the `log` facade regardless of the feature.
//!
//! # Example
//!
//! ```rust,ignore
//! use rust_job_system::prelude::*;
//! use tracing_subscriber::{fmt, prelude::*, EnvFilter};
//!
//! tracing_subscriber::registry()
//!     .with(fmt::layer())
//!     .with(EnvFilter::from_default_env()
//!         .add_directive("rust_job_system=debug".parse().unwrap()))
//!     .init();
//!
//! let pool = ThreadPool::with_threads(4)?;
//! let _frame = tracing::info_span!("frame", index = 42).entered();
//! pool.submit_traced(ClosureJob::new(|| Ok(())));
//! ```

use crate::core::{Job, Result};

/// A job wrapper that carries a tracing span across the thread boundary.
///
/// The span current at construction time is entered while the wrapped job
/// runs on the worker. Without the `tracing` feature it is a transparent
/// wrapper.
pub struct TracedJob<J: Job> {
    inner: J,
    #[cfg(feature = "tracing")]
    span: tracing::Span,
}

impl<J: Job> TracedJob<J> {
    /// Wrap `job`, capturing the current span.
    pub fn new(job: J) -> Self {
        Self {
            inner: job,
            #[cfg(feature = "tracing")]
            span: tracing::Span::current(),
        }
    }

    /// Wrap `job` with an explicit span.
    #[cfg(feature = "tracing")]
    pub fn with_span(job: J, span: tracing::Span) -> Self {
        Self { inner: job, span }
    }
}

impl<J: Job> Job for TracedJob<J> {
    fn execute(&mut self) -> Result<()> {
        #[cfg(feature = "tracing")]
        let _guard = self.span.enter();
        self.inner.execute()
    }

    fn job_type(&self) -> &str {
        self.inner.job_type()
    }
}

/// Pool events for metrics layers.
///
/// Each helper emits one tracing event whose `counter.*`, `gauge.*` and
/// `histogram.*` fields a metrics layer can aggregate. Events name the pool
/// worker (or `inline` for work run on the caller after termination) and the
/// job type.
#[cfg(feature = "tracing")]
pub mod metrics {
    use std::time::Duration;

    /// A job ran on worker `worker_id`; `outcome` is `completed`, `failed`
    /// or `panicked`.
    #[inline]
    pub fn record_job(worker_id: usize, job_type: &str, elapsed: Duration, outcome: &'static str) {
        tracing::trace!(
            counter.jobs_run = 1,
            histogram.job_duration_us = elapsed.as_micros() as u64,
            worker_id,
            job_type,
            outcome,
            "job finished on worker"
        );
    }

    /// A job ran on the submitting thread because the pool was terminated.
    #[inline]
    pub fn record_inline_job(job_type: &str, elapsed: Duration, outcome: &'static str) {
        tracing::debug!(
            counter.jobs_run_inline = 1,
            histogram.job_duration_us = elapsed.as_micros() as u64,
            job_type,
            outcome,
            "job ran on caller thread"
        );
    }

    /// A worker woke up with `queued` jobs waiting.
    #[inline]
    pub fn record_drain_start(worker_id: usize, queued: usize) {
        tracing::trace!(gauge.workers_busy = 1, worker_id, queued, "worker draining");
    }

    /// A worker emptied its queue after running `jobs_run` jobs.
    #[inline]
    pub fn record_drain_end(worker_id: usize, jobs_run: u64) {
        tracing::trace!(gauge.workers_busy = -1i64, worker_id, jobs_run, "worker idle");
    }

    /// `cancelled` pending jobs were discarded across all workers.
    #[inline]
    pub fn record_cancelled(pool_id: u64, cancelled: usize) {
        tracing::debug!(
            counter.jobs_cancelled = cancelled as u64,
            pool_id,
            "pending jobs cancelled"
        );
    }

    /// A pool spawned its workers.
    #[inline]
    pub fn record_pool_start(pool_id: u64, workers: usize, thread_name_prefix: &str, poll_interval: Duration) {
        tracing::info!(
            pool_id,
            workers,
            thread_name_prefix,
            poll_interval_ms = poll_interval.as_millis() as u64,
            "thread pool started"
        );
    }

    /// A pool stopped accepting work and joined its workers.
    #[inline]
    pub fn record_pool_termination(pool_id: u64, processed: u64, failed: u64, panicked: u64) {
        tracing::info!(
            pool_id,
            counter.jobs_processed = processed,
            counter.jobs_failed = failed,
            counter.jobs_panicked = panicked,
            "thread pool terminated"
        );
    }
}
