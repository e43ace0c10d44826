//! Spin-lock protected queues used for task hand-off and failure reporting.
//!
//! Each worker of the [`ThreadPool`](crate::pool::ThreadPool) owns one
//! [`ThreadSafeQueue`] of jobs, and the pool shares one more for captured
//! failure messages.

mod thread_safe_queue;

pub use thread_safe_queue::{ThreadSafeQueue, TryPop};
