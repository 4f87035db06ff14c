use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use serde::Serialize;

use crate::tw_error::InvalidStatus;
use crate::types::TaskStatus;

/// Longest message kept verbatim; longer messages are cut and marked.
pub const MAX_MESSAGE_CHARS: usize = 100;
pub const TRUNCATION_MARKER: &str = "...";

/// Per-task UI state. A projection for renderers, not a scheduling input.
#[derive(Serialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct TaskState {
    pub status: TaskStatus,
    pub current_step: Option<String>,
    pub last_message: Option<String>,
}

/// Result of a mutation addressed to a task by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    UnknownTask,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, UpdateOutcome::Applied)
    }
}

/// Task list accepted by [`StateTracker::initialize`].
pub enum InitialTasks {
    Names(Vec<String>),
    WithStatus(Vec<(String, TaskStatus)>),
}

impl From<Vec<String>> for InitialTasks {
    fn from(names: Vec<String>) -> Self {
        InitialTasks::Names(names)
    }
}

impl From<Vec<&str>> for InitialTasks {
    fn from(names: Vec<&str>) -> Self {
        InitialTasks::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<(String, TaskStatus)>> for InitialTasks {
    fn from(entries: Vec<(String, TaskStatus)>) -> Self {
        InitialTasks::WithStatus(entries)
    }
}

impl From<HashMap<String, TaskStatus>> for InitialTasks {
    fn from(map: HashMap<String, TaskStatus>) -> Self {
        InitialTasks::WithStatus(map.into_iter().collect())
    }
}

impl From<BTreeMap<String, TaskStatus>> for InitialTasks {
    fn from(map: BTreeMap<String, TaskStatus>) -> Self {
        InitialTasks::WithStatus(map.into_iter().collect())
    }
}

/// Truncate `message` to [`MAX_MESSAGE_CHARS`] characters, appending the marker
/// when anything was cut. Empty input clears the message.
pub fn truncate_message(message: &str) -> Option<String> {
    if message.is_empty() {
        return None;
    }
    if message.chars().count() <= MAX_MESSAGE_CHARS {
        return Some(message.to_string());
    }
    let mut cut: String = message.chars().take(MAX_MESSAGE_CHARS).collect();
    cut.push_str(TRUNCATION_MARKER);
    Some(cut)
}

/// Authoritative map of ephemeral per-task UI state.
///
/// Shared through `Arc` between the scheduler, running workflows and a renderer.
/// Every mutation holds the lock for one entry write, so a snapshot never sees a
/// half-updated task.
#[derive(Debug, Default)]
pub struct StateTracker {
    states: Mutex<HashMap<String, TaskState>>,
    renderer_active: AtomicBool,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide default tracker. The scheduler never requires it.
    pub fn global() -> &'static Arc<StateTracker> {
        static TRACKER: OnceLock<Arc<StateTracker>> = OnceLock::new();
        TRACKER.get_or_init(|| Arc::new(StateTracker::new()))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskState>> {
        // Critical sections are single assignments or clones; a poisoned map is still consistent.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the tracker for a new run. Call once before scheduling starts.
    pub fn initialize(&self, tasks: impl Into<InitialTasks>) {
        let entries: Vec<(String, TaskStatus)> = match tasks.into() {
            InitialTasks::Names(names) => names
                .into_iter()
                .map(|n| (n, TaskStatus::Pending))
                .collect(),
            InitialTasks::WithStatus(entries) => entries,
        };

        let mut states = self.lock();
        states.clear();
        for (name, status) in entries {
            states.insert(
                name,
                TaskState {
                    status,
                    ..TaskState::default()
                },
            );
        }
        drop(states);
        self.renderer_active.store(false, Ordering::SeqCst);
    }

    fn with_task<F>(&self, name: &str, apply: F) -> UpdateOutcome
    where
        F: FnOnce(&mut TaskState),
    {
        let mut states = self.lock();
        match states.get_mut(name) {
            Some(state) => {
                apply(state);
                UpdateOutcome::Applied
            }
            None => UpdateOutcome::UnknownTask,
        }
    }

    pub fn update_status(&self, name: &str, status: TaskStatus) -> UpdateOutcome {
        self.with_task(name, |s| s.status = status)
    }

    /// Like [`update_status`](Self::update_status) but for an untyped status string.
    pub fn update_status_str(
        &self,
        name: &str,
        status: &str,
    ) -> Result<UpdateOutcome, InvalidStatus> {
        let status: TaskStatus = status.parse()?;
        Ok(self.update_status(name, status))
    }

    pub fn update_step(&self, name: &str, step: Option<&str>) -> UpdateOutcome {
        let step = step.filter(|s| !s.is_empty()).map(str::to_string);
        self.with_task(name, |s| s.current_step = step)
    }

    pub fn update_message(&self, name: &str, message: Option<&str>) -> UpdateOutcome {
        let message = message.and_then(truncate_message);
        self.with_task(name, |s| s.last_message = message)
    }

    /// Deep copy of every task's state, ordered by task name.
    pub fn snapshot(&self) -> BTreeMap<String, TaskState> {
        self.lock()
            .iter()
            .map(|(name, state)| (name.clone(), state.clone()))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<TaskState> {
        self.lock().get(name).cloned()
    }

    /// Hint for phase runners: a live dashboard owns the terminal.
    pub fn set_renderer_active(&self, active: bool) {
        self.renderer_active.store(active, Ordering::SeqCst);
    }

    pub fn is_renderer_active(&self) -> bool {
        self.renderer_active.load(Ordering::SeqCst)
    }
}
