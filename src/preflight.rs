use std::path::Path;

use crate::config::{TaskweaveConfig, CONFIG_FILE_NAME};
use crate::graph::{detect_cycles, TaskGraph};
use crate::store::{load_graph, FileDeclarationStore, TASK_FILE_NAME};

/// A single preflight validation error with actionable context.
#[derive(Debug, Clone, PartialEq)]
pub struct PreflightError {
    /// What condition failed.
    pub condition: String,
    /// Where the error originates (config key or task file).
    pub config_location: String,
    /// How to fix it.
    pub suggested_fix: String,
}

impl std::fmt::Display for PreflightError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Preflight error: {}\n  Location: {}\n  Fix: {}",
            self.condition, self.config_location, self.suggested_fix
        )
    }
}

/// A structural problem in the dependency graph.
///
/// These do not stop a run: the scheduler routes them through deadlock
/// resolution, which may repair the declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphDiagnostic {
    /// `task` depends on a name that is not a task; it can never become ready.
    UnsatisfiableDependency { task: String, dependency: String },
    CircularDependency { cycle: Vec<String> },
}

impl GraphDiagnostic {
    pub fn to_error(&self, tasks_dir: &Path) -> PreflightError {
        match self {
            GraphDiagnostic::UnsatisfiableDependency { task, dependency } => PreflightError {
                condition: format!(
                    "Task '{}' depends on '{}' which is not a task",
                    task, dependency
                ),
                config_location: format!(
                    "{} → Dependencies",
                    tasks_dir.join(task).join(TASK_FILE_NAME).display()
                ),
                suggested_fix: format!(
                    "Remove '{}' from {}'s dependencies, or create {}",
                    dependency,
                    task,
                    tasks_dir.join(dependency).join(TASK_FILE_NAME).display()
                ),
            },
            GraphDiagnostic::CircularDependency { cycle } => {
                let members = cycle[..cycle.len().saturating_sub(1)].join(", ");
                PreflightError {
                    condition: format!("Circular dependency detected: {}", cycle.join(" → ")),
                    config_location: format!("{} → Dependencies", tasks_dir.display()),
                    suggested_fix: format!(
                        "Remove one dependency in the cycle to break it: {}",
                        members
                    ),
                }
            }
        }
    }
}

/// The loaded graph plus non-fatal diagnostics.
#[derive(Debug)]
pub struct PreflightReport {
    pub graph: TaskGraph,
    pub diagnostics: Vec<GraphDiagnostic>,
}

/// Run all preflight validation checks.
///
/// Phases:
/// 1. Structural validation of the config
/// 2. Tasks directory check (`tasks_dir` is already resolved against the config base)
/// 3. Graph load (duplicate names, unreadable task files)
/// 4. Dependency graph diagnostics (dangling references, cycles)
///
/// Phases 1-3 are fatal and returned as `Err` together. Phase 4 findings are
/// returned in the report.
pub fn run_preflight(
    config: &TaskweaveConfig,
    tasks_dir: &Path,
) -> Result<PreflightReport, Vec<PreflightError>> {
    let mut errors = validate_structure(config);

    if !tasks_dir.is_dir() {
        errors.push(PreflightError {
            condition: format!("Tasks directory {} not found", tasks_dir.display()),
            config_location: format!("{} → project.tasks_dir", CONFIG_FILE_NAME),
            suggested_fix: format!(
                "Create {} with one subdirectory per task, each holding a {}",
                tasks_dir.display(),
                TASK_FILE_NAME
            ),
        });
        return Err(errors);
    }

    let store = FileDeclarationStore::new(tasks_dir);
    let graph = match load_graph(&store) {
        Ok(graph) => graph,
        Err(e) => {
            errors.push(PreflightError {
                condition: e.to_string(),
                config_location: tasks_dir.display().to_string(),
                suggested_fix: "Make every task directory name unique and every task file readable"
                    .to_string(),
            });
            return Err(errors);
        }
    };

    if graph.is_empty() {
        errors.push(PreflightError {
            condition: format!("No tasks found in {}", tasks_dir.display()),
            config_location: format!("{} → project.tasks_dir", CONFIG_FILE_NAME),
            suggested_fix: format!(
                "Add a directory per task containing {}",
                TASK_FILE_NAME
            ),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let diagnostics = validate_dependency_graph(&graph);
    Ok(PreflightReport { graph, diagnostics })
}

// --- Phase 1: Structural validation ---

/// Validate config structure with actionable error messages.
///
/// Same checks as `config::validate()`, with a location and fix for each.
fn validate_structure(config: &TaskweaveConfig) -> Vec<PreflightError> {
    let mut errors = Vec::new();
    let execution = &config.execution;

    if execution.max_concurrency == Some(0) {
        errors.push(PreflightError {
            condition: "max_concurrency must be >= 1".to_string(),
            config_location: format!("{} → execution.max_concurrency", CONFIG_FILE_NAME),
            suggested_fix: "Set max_concurrency to at least 1, or remove it to use the default"
                .to_string(),
        });
    }

    if !execution.unbounded_attempts && execution.max_attempts < 1 {
        errors.push(PreflightError {
            condition: "max_attempts must be >= 1".to_string(),
            config_location: format!("{} → execution.max_attempts", CONFIG_FILE_NAME),
            suggested_fix: "Set max_attempts to at least 1, or set unbounded_attempts = true"
                .to_string(),
        });
    }

    if execution.phase_timeout_minutes < 1 {
        errors.push(PreflightError {
            condition: "phase_timeout_minutes must be >= 1".to_string(),
            config_location: format!("{} → execution.phase_timeout_minutes", CONFIG_FILE_NAME),
            suggested_fix: "Set phase_timeout_minutes to at least 1".to_string(),
        });
    }

    if execution.phases.is_empty() {
        errors.push(PreflightError {
            condition: "No phases enabled".to_string(),
            config_location: format!("{} → execution.phases", CONFIG_FILE_NAME),
            suggested_fix: "Enable at least one of \"plan\", \"implement\", \"review\"".to_string(),
        });
    }

    for (key, value) in [
        ("project.tasks_dir", &config.project.tasks_dir),
        ("project.runtime_dir", &config.project.runtime_dir),
    ] {
        if value.trim().is_empty() {
            errors.push(PreflightError {
                condition: format!("{} is empty", key),
                config_location: format!("{} → {}", CONFIG_FILE_NAME, key),
                suggested_fix: "Set a directory path relative to the project root".to_string(),
            });
        }
    }

    errors
}

// --- Phase 4: Dependency graph diagnostics ---

/// Dangling references first (graph order), then cycles.
pub fn validate_dependency_graph(graph: &TaskGraph) -> Vec<GraphDiagnostic> {
    let mut diagnostics: Vec<GraphDiagnostic> = graph
        .dangling_dependencies()
        .into_iter()
        .map(|(task, dependency)| GraphDiagnostic::UnsatisfiableDependency { task, dependency })
        .collect();

    diagnostics.extend(
        detect_cycles(graph)
            .into_iter()
            .map(|cycle| GraphDiagnostic::CircularDependency { cycle }),
    );

    diagnostics
}

