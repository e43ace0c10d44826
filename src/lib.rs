//! # Rust Job System
//!
//! The concurrency core of an engine: a spin-lock protected task queue, a
//! fixed-size worker pool with one queue per thread, and a process-wide job
//! system that hands back futures for submitted work.
//!
//! ## Features
//!
//! - **Spin lock**: test-and-set lock with backoff, for very short critical sections
//! - **Thread-safe queue**: FIFO with non-blocking `try_*` and retrying blocking operations
//! - **Thread pool**: round-robin or targeted assignment, cancellation of pending
//!   work, graceful termination, failure capture at the worker boundary
//! - **Job system**: weak singleton with future-based submission
//!
//! ## Quick Start
//!
//! ```rust
//! use rust_job_system::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let jobs = JobSystem::instantiate()?;
//!
//! // Typed result
//! let answer = jobs.submit(|| 6 * 7);
//! assert_eq!(answer.wait()?, 42);
//!
//! // Fire-and-forget work still yields a completion future
//! let done = jobs.submit(|| println!("streaming level chunk"));
//! done.wait()?;
//!
//! JobSystem::destroy(jobs);
//! # Ok(())
//! # }
//! ```
//!
//! ## Using the pool directly
//!
//! ```rust
//! use rust_job_system::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let pool = ThreadPool::with_config(
//!     ThreadPoolConfig::new(4).with_thread_name_prefix("render"),
//! )?;
//!
//! // Tasks on the same worker keep their order
//! pool.assign_task_to(2, || println!("first"));
//! pool.assign_task_to(2, || println!("second"));
//!
//! pool.assign_task(|| panic!("bad mesh"));
//! pool.terminate()?;
//!
//! assert_eq!(pool.drain_exceptions(), vec!["bad mesh".to_string()]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod sync;
pub mod system;
pub mod tracing;

pub use crate::core::{
    promise, BoxedJob, ClosureJob, Job, JobError, JobFuture, Promise, Result, Task,
};
pub use pool::{ThreadPool, ThreadPoolConfig, WorkerStats};
pub use queue::{ThreadSafeQueue, TryPop};
pub use sync::{RawSpinLock, SpinLock, SpinLockGuard};
pub use system::{JobSystem, JobSystemConfig};
