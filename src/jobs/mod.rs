//! Asynchronous job execution.
//!
//! Workflows run as background jobs: `submit` returns an id immediately,
//! a bounded worker pool drains the queue, and callers poll `status` /
//! `result` or request `cancel` without ever blocking on execution.

mod job;
mod manager;
mod store;

pub use job::{Job, JobStatus, StepResult};
pub use manager::JobManager;
pub use store::JobStore;
