//! Workflow planning and execution.
//!
//! A workflow is an ordered, dependency-constrained sequence of tool
//! invocations produced for one user request. The planner builds plans
//! against a catalog snapshot; the executor runs them against the
//! orchestrator with outputs flowing between steps.

mod executor;
mod plan;
mod planner;

pub use executor::{ExecutionOutcome, WorkflowExecutor};
pub use plan::{ParamValue, WorkflowPlan, WorkflowStep};
pub use planner::WorkflowPlanner;
