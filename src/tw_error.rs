use crate::types::Phase;

/// A status string outside `pending`, `running`, `completed`, `failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid status '{0}': expected pending, running, completed, or failed")]
pub struct InvalidStatus(pub String);

/// A phase invocation failed (non-zero exit, timeout, spawn failure).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{task}][{}] {reason}", .phase.as_str().to_uppercase())]
pub struct RunnerError {
    pub task: String,
    pub phase: Phase,
    pub reason: String,
}

impl RunnerError {
    pub fn new(task: &str, phase: Phase, reason: impl Into<String>) -> Self {
        Self {
            task: task.to_string(),
            phase,
            reason: reason.into(),
        }
    }
}

/// Task-level terminal failures. The scheduler records these and moves on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("Task {task} not approved after {attempts} attempts")]
    MaxAttemptsExceeded { task: String, attempts: u32 },

    #[error("Task {task} needs the {phase} phase, which is not enabled for this run")]
    PhaseNotEnabled { task: String, phase: Phase },
}

impl WorkflowError {
    /// Returns true when the task ran out of attempts rather than erroring.
    pub fn is_exhaustion(&self) -> bool {
        matches!(self, WorkflowError::MaxAttemptsExceeded { .. })
    }
}

/// Graph-level terminal failure: deadlock resolution could not restore progress.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeadlockError {
    #[error("{} cycle(s) remain after resolution: {}", .cycles.len(), format_cycles(.cycles))]
    CyclesRemain {
        cycles: Vec<Vec<String>>,
        blocked: Vec<String>,
    },

    #[error("Dependency resolution agent failed: {reason}")]
    AgentFailed { reason: String, blocked: Vec<String> },

    #[error("Failed to reload dependency declarations: {reason}")]
    ReloadFailed { reason: String, blocked: Vec<String> },

    #[error("Deadlock persists after {attempts} resolution attempt(s)")]
    AttemptsExhausted { attempts: u32, blocked: Vec<String> },
}

impl DeadlockError {
    /// Pending tasks left without a path to completion.
    pub fn blocked(&self) -> &[String] {
        match self {
            DeadlockError::CyclesRemain { blocked, .. }
            | DeadlockError::AgentFailed { blocked, .. }
            | DeadlockError::ReloadFailed { blocked, .. }
            | DeadlockError::AttemptsExhausted { blocked, .. } => blocked,
        }
    }

    pub fn cycles(&self) -> &[Vec<String>] {
        match self {
            DeadlockError::CyclesRemain { cycles, .. } => cycles,
            _ => &[],
        }
    }
}

/// Format cycles as `A → B → A; C → D → C`.
pub fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|c| c.join(" → "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from graph construction and the collaborator plumbing around the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum TwError {
    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Declaration store error: {0}")]
    Store(String),

    #[error("Run lock error: {0}")]
    Lock(String),

    #[error("Another taskweave run holds {} ({})", .path.display(), describe_holder(.holder))]
    RunLocked {
        path: std::path::PathBuf,
        holder: Option<u32>,
    },

    #[error(transparent)]
    InvalidStatus(#[from] InvalidStatus),

    #[error(transparent)]
    Deadlock(#[from] DeadlockError),
}

fn describe_holder(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!("PID {}", pid),
        None => "PID unknown".to_string(),
    }
}

/// Allows `?` on `TwError` inside the CLI's `Result<T, String>` plumbing.
impl From<TwError> for String {
    fn from(err: TwError) -> String {
        err.to_string()
    }
}
