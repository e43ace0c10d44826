//! Job trait and related types

use crate::core::error::{JobError, Result};
use std::fmt;

/// A trait representing a unit of work to be executed by the thread pool
pub trait Job: Send {
    /// Execute the job
    ///
    /// # Errors
    ///
    /// Returns an error if the job execution fails. The worker records the
    /// error message in the pool's failure queue and moves on.
    fn execute(&mut self) -> Result<()>;

    /// Get the job's type name for debugging and statistics
    fn job_type(&self) -> &str {
        "Job"
    }
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({})", self.job_type())
    }
}

/// A boxed job that can be sent across threads
pub type BoxedJob = Box<dyn Job>;

/// A job built from a fallible closure
pub struct ClosureJob<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    closure: Option<F>,
    name: String,
}

impl<F> ClosureJob<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    /// Create a new closure job
    pub fn new(closure: F) -> Self {
        Self {
            closure: Some(closure),
            name: "ClosureJob".to_string(),
        }
    }

    /// Create a new closure job with a custom name
    pub fn with_name<S: Into<String>>(closure: F, name: S) -> Self {
        Self {
            closure: Some(closure),
            name: name.into(),
        }
    }
}

impl<F> Job for ClosureJob<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    fn execute(&mut self) -> Result<()> {
        match self.closure.take() {
            Some(closure) => closure(),
            None => Err(JobError::other(
                "ClosureJob already executed - cannot execute twice",
            )),
        }
    }

    fn job_type(&self) -> &str {
        &self.name
    }
}

/// A plain task: a no-argument callable with nothing to report.
///
/// The only way a task fails is by panicking.
pub struct Task<F>
where
    F: FnOnce() + Send,
{
    body: Option<F>,
}

impl<F> Task<F>
where
    F: FnOnce() + Send,
{
    /// Wrap a closure as a task
    pub fn new(body: F) -> Self {
        Self { body: Some(body) }
    }
}

impl<F> Job for Task<F>
where
    F: FnOnce() + Send,
{
    fn execute(&mut self) -> Result<()> {
        match self.body.take() {
            Some(body) => {
                body();
                Ok(())
            }
            None => Err(JobError::other("Task already executed - cannot execute twice")),
        }
    }

    fn job_type(&self) -> &str {
        "Task"
    }
}
