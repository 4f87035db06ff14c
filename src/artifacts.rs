use std::fs;
use std::path::PathBuf;

pub const PLAN_FILE_NAME: &str = "PLAN.md";
pub const IMPLEMENTATION_FILE_NAME: &str = "IMPLEMENTATION.md";
pub const REVIEW_FILE_NAME: &str = "REVIEW.md";

const IMPLEMENTATION_COMPLETE_MARKER: (&str, &str) = ("status", "complete");
const REVIEW_APPROVED_MARKER: (&str, &str) = ("verdict", "approved");

/// Completion predicates over artifacts owned by the phase agents.
pub trait CompletionOracle: Send + Sync {
    fn has_plan(&self, task: &str) -> bool;
    fn is_implemented(&self, task: &str) -> bool;
    fn is_review_approved(&self, task: &str) -> bool;

    /// All three predicates hold; the workflow has nothing left to do.
    fn is_fully_done(&self, task: &str) -> bool {
        self.has_plan(task) && self.is_implemented(task) && self.is_review_approved(task)
    }
}

/// Reads `PLAN.md`, `IMPLEMENTATION.md` and `REVIEW.md` from each task directory.
///
/// - plan: `PLAN.md` exists and is not blank
/// - implemented: `IMPLEMENTATION.md` has a `Status: complete` line
/// - approved: `REVIEW.md` has a `Verdict: approved` line
#[derive(Clone, Debug)]
pub struct FileCompletionOracle {
    tasks_dir: PathBuf,
}

impl FileCompletionOracle {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: tasks_dir.into(),
        }
    }

    fn artifact(&self, task: &str, file: &str) -> Option<String> {
        fs::read_to_string(self.tasks_dir.join(task).join(file)).ok()
    }
}

/// True if any line reads `key: value` (case-insensitive, markdown emphasis ignored).
pub fn has_marker_line(contents: &str, key: &str, value: &str) -> bool {
    contents.lines().any(|line| {
        let cleaned: String = line.chars().filter(|c| *c != '*' && *c != '_').collect();
        let cleaned = cleaned.trim().trim_start_matches(['-', '>']).trim();
        match cleaned.split_once(':') {
            Some((k, v)) => k.trim().eq_ignore_ascii_case(key) && v.trim().eq_ignore_ascii_case(value),
            None => false,
        }
    })
}

impl CompletionOracle for FileCompletionOracle {
    fn has_plan(&self, task: &str) -> bool {
        self.artifact(task, PLAN_FILE_NAME)
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    fn is_implemented(&self, task: &str) -> bool {
        let (key, value) = IMPLEMENTATION_COMPLETE_MARKER;
        self.artifact(task, IMPLEMENTATION_FILE_NAME)
            .map(|c| has_marker_line(&c, key, value))
            .unwrap_or(false)
    }

    fn is_review_approved(&self, task: &str) -> bool {
        let (key, value) = REVIEW_APPROVED_MARKER;
        self.artifact(task, REVIEW_FILE_NAME)
            .map(|c| has_marker_line(&c, key, value))
            .unwrap_or(false)
    }
}
