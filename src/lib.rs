//! Conductor: a tool orchestration runtime.
//!
//! Conductor unifies heterogeneous tool sources — in-process implementations
//! and remote tool-protocol servers — behind one discovery and execution
//! contract, plans dependency-aware workflows over that catalog, and runs
//! them as cancellable, pollable background jobs.
//!
//! # Architecture
//!
//! ```text
//! request ──► WorkflowPlanner ──► JobManager.submit ──► worker pool
//!                                                          │
//!                                                  WorkflowExecutor
//!                                                          │ per step
//!                                                    Orchestrator
//!                                                    /           \
//!                                           ToolRegistry    ServerRegistry
//!                                           (in-process)    (RemoteClient per
//!                                                            registered server)
//! ```
//!
//! The orchestrator merges both catalogs into one logical view (internal
//! tools win name collisions), the executor feeds step outputs into later
//! step parameters, and the job store keeps a per-job record that callers
//! poll without ever blocking on execution.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod remote;
pub mod tools;
pub mod workflow;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::catalog::{ToolDescriptor, ToolSource};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::jobs::{Job, JobManager, JobStatus, StepResult};
    pub use crate::orchestrator::{HealthReport, HealthStatus, Orchestrator};
    pub use crate::remote::{RemoteClient, ServerRegistration, ServerRegistry};
    pub use crate::tools::{Tool, ToolOutput, ToolRegistry};
    pub use crate::workflow::{WorkflowExecutor, WorkflowPlan, WorkflowPlanner, WorkflowStep};
}
