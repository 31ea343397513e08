//! Job record and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::workflow::WorkflowPlan;

/// Job lifecycle states.
///
/// `Queued → Running → {Completed, Failed}`; `Cancelled` is reachable from
/// `Queued` and `Running`. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the job can still change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Terminal record of one workflow step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_index: usize,
    pub tool: String,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    pub fn success(step_index: usize, tool: &str, output: serde_json::Value) -> Self {
        Self {
            step_index,
            tool: tool.to_string(),
            success: true,
            output: Some(output),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(step_index: usize, tool: &str, error: impl Into<String>) -> Self {
        Self {
            step_index,
            tool: tool.to_string(),
            success: false,
            output: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// One submitted workflow and everything observable about its execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    /// Terminal steps over total steps, as a percentage.
    pub progress: u8,
    pub plan: WorkflowPlan,
    pub step_results: Vec<StepResult>,
    /// Output of the final step once the job completed.
    pub final_result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job for a plan.
    pub fn new(plan: WorkflowPlan) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            progress: 0,
            plan,
            step_results: Vec::new(),
            final_result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `next`, enforcing the transition matrix. Entering a terminal
    /// state stamps `completed_at`.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), JobError> {
        if !self.status.can_transition_to(next) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record one terminal step and refresh progress.
    pub fn record_step(&mut self, result: StepResult) {
        self.step_results.push(result);
        let total = self.plan.len().max(1);
        self.progress = ((self.step_results.len() * 100) / total).min(100) as u8;
    }
}
