//! Convenient re-exports for common types and traits

pub use crate::core::{BoxedJob, ClosureJob, Job, JobError, JobFuture, Result, Task};
pub use crate::pool::{ThreadPool, ThreadPoolConfig, WorkerStats};
pub use crate::queue::{ThreadSafeQueue, TryPop};
pub use crate::sync::SpinLock;
pub use crate::system::{JobSystem, JobSystemConfig};
