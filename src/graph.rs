use std::collections::{HashMap, HashSet};

use crate::tw_error::TwError;
use crate::types::TaskStatus;

/// Dependency entries that mean "no dependencies" rather than a task name.
const NO_DEPENDENCY_SENTINELS: [&str; 3] = ["none", "n/a", "-"];

/// A unit of work tracked by the scheduler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub dependencies: Vec<String>,
    pub status: TaskStatus,
}

/// In-memory dependency graph. Iteration follows declaration order.
///
/// Dependencies may name tasks that are not in the graph. Such edges are never
/// satisfied, so the dependent task stays pending until its declaration is rewritten.
#[derive(Clone, Debug, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

/// Normalize a raw dependency list for `task_name`.
///
/// Trims entries, drops empties, the "none" sentinels and self-references, and
/// removes duplicates while keeping first-occurrence order.
pub fn normalize_dependencies<S: AsRef<str>>(task_name: &str, raw: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.iter()
        .map(|d| d.as_ref().trim())
        .filter(|d| !d.is_empty())
        .filter(|d| {
            !NO_DEPENDENCY_SENTINELS
                .iter()
                .any(|s| d.eq_ignore_ascii_case(s))
        })
        .filter(|d| *d != task_name)
        .filter(|d| seen.insert(d.to_string()))
        .map(str::to_string)
        .collect()
}

impl TaskGraph {
    /// Build a graph from `(name, dependencies)` declarations. All tasks start pending.
    pub fn from_declarations<I, N, D>(declarations: I) -> Result<Self, TwError>
    where
        I: IntoIterator<Item = (N, Vec<D>)>,
        N: Into<String>,
        D: AsRef<str>,
    {
        let mut graph = TaskGraph::default();
        for (name, deps) in declarations {
            let name = name.into();
            let dependencies = normalize_dependencies(&name, &deps);
            graph.insert(Task {
                name,
                dependencies,
                status: TaskStatus::Pending,
            })?;
        }
        Ok(graph)
    }

    fn insert(&mut self, task: Task) -> Result<(), TwError> {
        if self.index.contains_key(&task.name) {
            return Err(TwError::DuplicateTask(task.name));
        }
        self.index.insert(task.name.clone(), self.tasks.len());
        self.tasks.push(task);
        Ok(())
    }

    /// Rebuild with fresh dependencies for pending tasks, carrying every other
    /// task's status and dependencies over from `self`.
    ///
    /// `reload` is only called for pending tasks.
    pub fn rebuild_pending<F>(&self, mut reload: F) -> Result<TaskGraph, TwError>
    where
        F: FnMut(&str) -> Result<Vec<String>, TwError>,
    {
        let mut rebuilt = TaskGraph::default();
        for task in &self.tasks {
            let dependencies = if task.status == TaskStatus::Pending {
                let raw = reload(&task.name)?;
                normalize_dependencies(&task.name, &raw)
            } else {
                task.dependencies.clone()
            };
            rebuilt.insert(Task {
                name: task.name.clone(),
                dependencies,
                status: task.status,
            })?;
        }
        Ok(rebuilt)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.index.get(name).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.get(name).map(|t| t.status)
    }

    pub fn set_status(&mut self, name: &str, status: TaskStatus) -> Result<(), TwError> {
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| TwError::TaskNotFound(name.to_string()))?;
        self.tasks[idx].status = status;
        Ok(())
    }

    fn is_dependency_met(&self, dep: &str) -> bool {
        self.status_of(dep) == Some(TaskStatus::Completed)
    }

    /// Pending tasks whose every dependency exists and is completed.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| t.dependencies.iter().all(|d| self.is_dependency_met(d)))
            .collect()
    }

    /// Dependencies of `name` that are missing or not yet completed.
    pub fn unmet_dependencies(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(task) => task
                .dependencies
                .iter()
                .filter(|d| !self.is_dependency_met(d))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Edges `(task, dependency)` whose dependency names no task in the graph.
    pub fn dangling_dependencies(&self) -> Vec<(String, String)> {
        self.tasks
            .iter()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .filter(|d| !self.contains(d))
                    .map(|d| (t.name.clone(), d.clone()))
            })
            .collect()
    }

    fn names_with(&self, status: TaskStatus) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn pending_names(&self) -> Vec<String> {
        self.names_with(TaskStatus::Pending)
    }

    pub fn running_names(&self) -> Vec<String> {
        self.names_with(TaskStatus::Running)
    }

    pub fn completed_names(&self) -> Vec<String> {
        self.names_with(TaskStatus::Completed)
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.names_with(TaskStatus::Failed)
    }

    /// First failed task among `name`'s dependencies, following pending
    /// dependencies transitively. Used to fail tasks that can no longer run.
    pub fn failed_ancestor(&self, name: &str) -> Option<String> {
        let mut stack: Vec<&str> = vec![name];
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(task) = self.get(current) else {
                continue;
            };
            for dep in &task.dependencies {
                match self.status_of(dep) {
                    Some(TaskStatus::Failed) => return Some(dep.clone()),
                    Some(TaskStatus::Pending) => stack.push(dep),
                    _ => {}
                }
            }
        }
        None
    }
}

// --- Cycle detection ---

/// Find circular dependency chains with a depth-first search.
///
/// Each cycle is reported as a path whose first element repeats as the last,
/// e.g. `["A", "B", "C", "A"]`. Edges to tasks outside the graph are ignored;
/// they are dangling, not circular. Returns an empty list for acyclic graphs.
pub fn detect_cycles(graph: &TaskGraph) -> Vec<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum VisitState {
        Unvisited,
        InStack,
        Done,
    }

    fn dfs<'a>(
        name: &'a str,
        graph: &'a TaskGraph,
        state: &mut HashMap<&'a str, VisitState>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        state.insert(name, VisitState::InStack);
        path.push(name);

        if let Some(task) = graph.get(name) {
            for dep in &task.dependencies {
                match state.get(dep.as_str()) {
                    Some(VisitState::InStack) => {
                        if let Some(start) = path.iter().position(|&n| n == dep.as_str()) {
                            let mut cycle: Vec<String> =
                                path[start..].iter().map(|&n| n.to_string()).collect();
                            cycle.push(dep.clone());
                            cycles.push(cycle);
                        }
                    }
                    Some(VisitState::Unvisited) => {
                        dfs(dep, graph, state, path, cycles);
                    }
                    // Done, or not a task in this graph
                    _ => {}
                }
            }
        }

        path.pop();
        state.insert(name, VisitState::Done);
    }

    let mut state: HashMap<&str, VisitState> = graph
        .tasks()
        .map(|t| (t.name.as_str(), VisitState::Unvisited))
        .collect();
    let mut cycles = Vec::new();

    for task in graph.tasks() {
        if state.get(task.name.as_str()) == Some(&VisitState::Unvisited) {
            let mut path = Vec::new();
            dfs(&task.name, graph, &mut state, &mut path, &mut cycles);
        }
    }

    cycles
}
