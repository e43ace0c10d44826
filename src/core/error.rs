//! Error types for the job system

/// Result type for job system operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors that can occur in the job system
///
/// Queue contention and submissions after termination are deliberately
/// absent: the former is reported through [`TryPop`](crate::queue::TryPop)
/// and the latter degrades to synchronous execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum JobError {
    /// Failed to spawn a worker thread
    #[error("Failed to spawn worker thread #{thread_id}: {message}")]
    SpawnError {
        /// Index of the worker that failed to spawn
        thread_id: usize,
        /// Error message
        message: String,
    },

    /// Failed to join a worker thread
    #[error("Failed to join worker thread #{thread_id}: {message}")]
    JoinError {
        /// Index of the worker that failed to join
        thread_id: usize,
        /// Error message
        message: String,
    },

    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// A task panicked while running on a worker
    #[error("Task panicked: {message}")]
    TaskPanicked {
        /// Panic message
        message: String,
    },

    /// The task was dropped before it produced a result (cancelled or
    /// discarded during teardown)
    #[error("Task was abandoned before completion")]
    Abandoned,

    /// General error
    #[error("{0}")]
    Other(String),
}

impl JobError {
    /// Create a spawn error
    pub fn spawn(thread_id: usize, message: impl Into<String>) -> Self {
        JobError::SpawnError {
            thread_id,
            message: message.into(),
        }
    }

    /// Create a join error
    pub fn join(thread_id: usize, message: impl Into<String>) -> Self {
        JobError::JoinError {
            thread_id,
            message: message.into(),
        }
    }

    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        JobError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a task panicked error
    pub fn task_panicked(message: impl Into<String>) -> Self {
        JobError::TaskPanicked {
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        JobError::Other(msg.into())
    }
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
