//! Error types for Conductor.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Tool registration and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Tool {name} is already registered")]
    Duplicate { name: String },

    #[error("Invalid parameters for tool {name}: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Tool {name} execution failed: {reason}")]
    ExecutionFailed { name: String, reason: String },

    #[error("Tool {name} timed out after {timeout:?}")]
    Timeout { name: String, timeout: Duration },
}

/// Remote server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid server configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Server {name} is not connected")]
    Unavailable { name: String },

    #[error("Server {name} not found")]
    NotFound { name: String },

    #[error("Connection to {name} failed: {reason}")]
    Connect { name: String, reason: String },

    #[error("Transport error talking to {name}: {reason}")]
    Transport { name: String, reason: String },

    #[error("Protocol error from {name}: {message} (code {code})")]
    Protocol {
        name: String,
        message: String,
        code: i64,
    },
}

impl ServerError {
    /// Whether the error is a transient transport failure worth retrying.
    ///
    /// Protocol errors are the server telling us the request itself is
    /// wrong; retrying those just repeats the mistake.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Connect { .. })
    }
}

/// Workflow plan validation errors.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Plan contains no steps")]
    Empty,

    #[error("Step {step} references unknown tool {tool}")]
    UnknownTool { step: usize, tool: String },

    #[error("Step {step} depends on step {dependency}, which is not an earlier step")]
    ForwardDependency { step: usize, dependency: usize },

    #[error("Duplicate step index {index}")]
    DuplicateStepIndex { index: usize },

    #[error("Duplicate output key {key}")]
    DuplicateOutputKey { key: String },

    #[error("Step {step} references output key {key} that no earlier step produces")]
    UnknownOutputKey { step: usize, key: String },
}

/// Job lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} is still {status}, result not ready")]
    NotReady { id: Uuid, status: String },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    #[error("Job queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Job queue is closed, worker pool has shut down")]
    QueueClosed,
}

/// Result type alias for the runtime.
pub type Result<T> = std::result::Result<T, Error>;
