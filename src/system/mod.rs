//! Singleton job system facade over the thread pool

pub mod job_system;

pub use job_system::{JobSystem, JobSystemConfig};
