use serde::{Deserialize, Serialize};

use crate::tw_error::InvalidStatus;

// --- Enums ---

/// Coarse lifecycle status of a task, shared by the graph and the UI state.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(InvalidStatus(s.to_string())),
        }
    }
}

/// One step of a task's workflow.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Plan,
    Implement,
    Review,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Plan, Phase::Implement, Phase::Review];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Implement => "implement",
            Phase::Review => "review",
        }
    }

    /// Progressive label used for UI step text ("Planning", "Implementing", ...).
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Plan => "Planning",
            Phase::Implement => "Implementing",
            Phase::Review => "Reviewing",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn parse_phase(s: &str) -> Result<Phase, String> {
    match s.trim().to_lowercase().as_str() {
        "plan" | "planning" => Ok(Phase::Plan),
        "implement" | "implementation" | "impl" => Ok(Phase::Implement),
        "review" => Ok(Phase::Review),
        _ => Err(format!(
            "Invalid phase '{}': expected plan, implement, or review",
            s
        )),
    }
}

// --- Phase filter ---

/// The subset of phases a run is allowed to execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PhaseSet {
    plan: bool,
    implement: bool,
    review: bool,
}

impl Default for PhaseSet {
    fn default() -> Self {
        Self::all()
    }
}

impl PhaseSet {
    pub fn all() -> Self {
        Self {
            plan: true,
            implement: true,
            review: true,
        }
    }

    pub fn only(phases: &[Phase]) -> Self {
        let mut set = Self {
            plan: false,
            implement: false,
            review: false,
        };
        for phase in phases {
            match phase {
                Phase::Plan => set.plan = true,
                Phase::Implement => set.implement = true,
                Phase::Review => set.review = true,
            }
        }
        set
    }

    pub fn contains(&self, phase: Phase) -> bool {
        match phase {
            Phase::Plan => self.plan,
            Phase::Implement => self.implement,
            Phase::Review => self.review,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.plan || self.implement || self.review)
    }

    /// True when planning is the only enabled phase.
    pub fn is_planning_only(&self) -> bool {
        self.plan && !self.implement && !self.review
    }

    pub fn phases(&self) -> Vec<Phase> {
        Phase::ALL
            .iter()
            .copied()
            .filter(|p| self.contains(*p))
            .collect()
    }
}

impl std::fmt::Display for PhaseSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.phases().iter().map(|p| p.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Parse a comma-separated phase list such as `plan,implement`.
pub fn parse_phase_set(s: &str) -> Result<PhaseSet, String> {
    let phases = s
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(parse_phase)
        .collect::<Result<Vec<_>, _>>()?;
    if phases.is_empty() {
        return Err("Phase list is empty: expected at least one of plan, implement, review".to_string());
    }
    Ok(PhaseSet::only(&phases))
}

// --- Attempt limits ---

/// Cap on workflow loop iterations for a single task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptLimit {
    Bounded(u32),
    Unbounded,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

impl Default for AttemptLimit {
    fn default() -> Self {
        AttemptLimit::Bounded(DEFAULT_MAX_ATTEMPTS)
    }
}

impl AttemptLimit {
    /// Whether a loop iteration numbered `attempt` (1-based) may run.
    pub fn allows(&self, attempt: u32) -> bool {
        match self {
            AttemptLimit::Bounded(max) => attempt <= *max,
            AttemptLimit::Unbounded => true,
        }
    }
}

impl std::fmt::Display for AttemptLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptLimit::Bounded(max) => write!(f, "{}", max),
            AttemptLimit::Unbounded => write!(f, "unbounded"),
        }
    }
}
