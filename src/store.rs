use std::fs;
use std::path::PathBuf;

use crate::graph::TaskGraph;
use crate::tw_error::TwError;

/// File inside each task directory that declares the task.
pub const TASK_FILE_NAME: &str = "TASK.md";

/// Heading whose section lists a task's dependencies.
const DEPENDENCIES_HEADING: &str = "dependencies";

/// Source of truth for task dependency declarations.
pub trait DeclarationStore: Send + Sync {
    /// Every declared task name, in a stable order.
    fn list_tasks(&self) -> Result<Vec<String>, TwError>;

    /// Declared dependencies of `task`, unnormalized.
    fn read_deps(&self, task: &str) -> Result<Vec<String>, TwError>;

    /// Raw dependency-declaration text of `task`, as an agent would edit it.
    fn read_raw(&self, task: &str) -> Result<String, TwError>;
}

/// Build a graph from every task in `store`.
pub fn load_graph(store: &impl DeclarationStore) -> Result<TaskGraph, TwError> {
    let names = store.list_tasks()?;
    let mut declarations = Vec::with_capacity(names.len());
    for name in names {
        let deps = store.read_deps(&name)?;
        declarations.push((name, deps));
    }
    TaskGraph::from_declarations(declarations)
}

/// Tasks stored as `{tasks_dir}/{name}/TASK.md`.
///
/// Dependencies are the entries of the `## Dependencies` section, one per bullet
/// or comma separated, with backticks ignored:
///
/// ```text
/// ## Dependencies
/// - `auth-service`
/// - storage, cache
/// ```
#[derive(Clone, Debug)]
pub struct FileDeclarationStore {
    tasks_dir: PathBuf,
}

impl FileDeclarationStore {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
        }
    }

    pub fn task_file(&self, task: &str) -> PathBuf {
        self.tasks_dir.join(task).join(TASK_FILE_NAME)
    }

    fn read_task_file(&self, task: &str) -> Result<String, TwError> {
        let path = self.task_file(task);
        fs::read_to_string(&path)
            .map_err(|e| TwError::Store(format!("Failed to read {}: {}", path.display(), e)))
    }
}

impl DeclarationStore for FileDeclarationStore {
    fn list_tasks(&self) -> Result<Vec<String>, TwError> {
        let entries = fs::read_dir(&self.tasks_dir).map_err(|e| {
            TwError::Store(format!(
                "Failed to read tasks directory {}: {}",
                self.tasks_dir.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry
                .map_err(|e| TwError::Store(format!("Failed to read directory entry: {}", e)))?;
            let path = entry.path();
            if path.is_dir() && path.join(TASK_FILE_NAME).is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read_deps(&self, task: &str) -> Result<Vec<String>, TwError> {
        let contents = self.read_task_file(task)?;
        Ok(parse_dependencies(&contents))
    }

    fn read_raw(&self, task: &str) -> Result<String, TwError> {
        let contents = self.read_task_file(task)?;
        Ok(dependency_section(&contents).unwrap_or_default())
    }
}

fn is_dependencies_heading(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('#')
        && trimmed
            .trim_start_matches('#')
            .trim()
            .eq_ignore_ascii_case(DEPENDENCIES_HEADING)
}

/// The `## Dependencies` heading and its body, up to the next heading.
pub fn dependency_section(contents: &str) -> Option<String> {
    let mut lines = contents.lines();
    let heading = lines.by_ref().find(|l| is_dependencies_heading(l))?;

    let mut section = vec![heading];
    section.extend(lines.take_while(|l| !l.trim_start().starts_with('#')));
    Some(section.join("\n").trim_end().to_string())
}

/// Dependency names declared in `contents`. Missing section means no dependencies.
pub fn parse_dependencies(contents: &str) -> Vec<String> {
    let Some(section) = dependency_section(contents) else {
        return Vec::new();
    };

    section
        .lines()
        .skip(1)
        .map(|l| l.trim().trim_start_matches(['-', '*', '+']).trim())
        .filter(|l| !l.is_empty())
        .flat_map(line_dependencies)
        .collect()
}

/// Names on one list line. Backtick-quoted names win over the rest of the
/// line, so `` `auth` (schema, v2) `` yields only `auth`.
fn line_dependencies(line: &str) -> Vec<String> {
    let segments: Vec<&str> = line.split('`').collect();
    // odd segments sit between a backtick pair; an unclosed trailing one is ignored
    let closed = segments.len() - 1 - (segments.len() - 1) % 2;
    let quoted: Vec<String> = segments[..closed]
        .iter()
        .skip(1)
        .step_by(2)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !quoted.is_empty() {
        return quoted;
    }

    line.split(',')
        .map(|d| d.trim().trim_matches('`').trim().to_string())
        .filter(|d| !d.is_empty())
        .collect()
}
