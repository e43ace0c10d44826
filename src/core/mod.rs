//! Core types and traits for the job system

pub mod error;
pub mod job;
pub mod promise;

pub use error::{JobError, Result};
pub use job::{BoxedJob, ClosureJob, Job, Task};
pub use promise::{promise, JobFuture, Promise};
