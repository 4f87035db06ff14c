#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use taskweave::agent::{PhaseRunner, ResolverAgent};
use taskweave::artifacts::CompletionOracle;
use taskweave::graph::TaskGraph;
use taskweave::resolver::DeadlockContext;
use taskweave::scheduler::{RunParams, ScheduleMode};
use taskweave::store::DeclarationStore;
use taskweave::tw_error::{RunnerError, TwError};
use taskweave::types::{AttemptLimit, Phase, PhaseSet};

/// Builds a `TaskGraph` from `(name, deps)` pairs.
pub fn make_graph(decls: &[(&str, &[&str])]) -> TaskGraph {
    TaskGraph::from_declarations(decls.iter().map(|(name, deps)| (*name, deps.to_vec())))
        .expect("test graph should build")
}

/// Default run parameters with the given wave width and no worklog.
pub fn run_params(width: usize) -> RunParams {
    RunParams {
        max_concurrency: width,
        phases: PhaseSet::all(),
        max_attempts: AttemptLimit::Bounded(5),
        max_resolution_attempts: 3,
        mode: ScheduleMode::DependencyGated,
        worklog_dir: None,
    }
}

/// Writes `{tasks_dir}/{name}/TASK.md` with a `## Dependencies` section.
pub fn write_task(tasks_dir: &Path, name: &str, deps: &[&str]) {
    let dir = tasks_dir.join(name);
    fs::create_dir_all(&dir).expect("create task dir");
    let dep_lines = if deps.is_empty() {
        "None".to_string()
    } else {
        deps.iter()
            .map(|d| format!("- {}", d))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let contents = format!(
        "# {}\n\nDo the thing.\n\n## Dependencies\n{}\n\n## Notes\nNothing yet.\n",
        name, dep_lines
    );
    fs::write(dir.join("TASK.md"), contents).expect("write TASK.md");
}

#[derive(Default)]
struct Inner {
    declarations: Vec<(String, Vec<String>)>,
    planned: HashSet<String>,
    implemented: HashSet<String>,
    approved: HashSet<String>,
    runner_calls: Vec<(String, Phase)>,
    failures: HashMap<(String, Phase), String>,
    never_implements: HashSet<String>,
    scripted_rewrites: VecDeque<Vec<(String, Vec<String>)>>,
    rewrite_contexts: Vec<DeadlockContext>,
    rewrite_failure: Option<String>,
}

/// In-memory project: declaration store, artifact oracle, phase runner and
/// resolver agent over shared state.
///
/// Running a phase makes its predicate true (plan → planned, implement →
/// implemented, review → approved), unless configured otherwise. Each resolver
/// call applies the next scripted rewrite.
#[derive(Default)]
pub struct FakeWorkspace {
    inner: Mutex<Inner>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeWorkspace {
    pub fn new(decls: &[(&str, &[&str])]) -> Self {
        let ws = Self::default();
        {
            let mut inner = ws.inner.lock().unwrap();
            inner.declarations = decls
                .iter()
                .map(|(n, d)| (n.to_string(), d.iter().map(|s| s.to_string()).collect()))
                .collect();
        }
        ws
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(self, task: &str, phase: Phase, reason: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failures
            .insert((task.to_string(), phase), reason.to_string());
        self
    }

    /// Implement runs for `task` succeed but never mark it implemented.
    pub fn never_implements(self, task: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .never_implements
            .insert(task.to_string());
        self
    }

    /// Mark every predicate of `task` true up front.
    pub fn already_done(self, task: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.planned.insert(task.to_string());
            inner.implemented.insert(task.to_string());
            inner.approved.insert(task.to_string());
        }
        self
    }

    /// Queue a rewrite: on the next resolver call, replace these tasks' deps.
    pub fn on_rewrite(self, changes: &[(&str, &[&str])]) -> Self {
        let changes = changes
            .iter()
            .map(|(n, d)| (n.to_string(), d.iter().map(|s| s.to_string()).collect()))
            .collect();
        self.inner
            .lock()
            .unwrap()
            .scripted_rewrites
            .push_back(changes);
        self
    }

    pub fn rewrite_fails(self, reason: &str) -> Self {
        self.inner.lock().unwrap().rewrite_failure = Some(reason.to_string());
        self
    }

    pub fn graph(&self) -> TaskGraph {
        taskweave::store::load_graph(self).expect("fake store graph should build")
    }

    pub fn runner_calls(&self) -> Vec<(String, Phase)> {
        self.inner.lock().unwrap().runner_calls.clone()
    }

    pub fn call_count(&self, task: &str, phase: Phase) -> usize {
        self.runner_calls()
            .iter()
            .filter(|(t, p)| t == task && *p == phase)
            .count()
    }

    pub fn rewrite_contexts(&self) -> Vec<DeadlockContext> {
        self.inner.lock().unwrap().rewrite_contexts.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PhaseRunner for FakeWorkspace {
    async fn run(&self, task: &str, phase: Phase) -> Result<(), RunnerError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut inner = self.inner.lock().unwrap();
        inner.runner_calls.push((task.to_string(), phase));
        if let Some(reason) = inner.failures.get(&(task.to_string(), phase)) {
            return Err(RunnerError::new(task, phase, reason.clone()));
        }
        match phase {
            Phase::Plan => {
                inner.planned.insert(task.to_string());
            }
            Phase::Implement => {
                if !inner.never_implements.contains(task) {
                    inner.implemented.insert(task.to_string());
                }
            }
            Phase::Review => {
                inner.approved.insert(task.to_string());
            }
        }
        Ok(())
    }
}

impl CompletionOracle for FakeWorkspace {
    fn has_plan(&self, task: &str) -> bool {
        self.inner.lock().unwrap().planned.contains(task)
    }

    fn is_implemented(&self, task: &str) -> bool {
        self.inner.lock().unwrap().implemented.contains(task)
    }

    fn is_review_approved(&self, task: &str) -> bool {
        self.inner.lock().unwrap().approved.contains(task)
    }
}

impl DeclarationStore for FakeWorkspace {
    fn list_tasks(&self) -> Result<Vec<String>, TwError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .declarations
            .iter()
            .map(|(n, _)| n.clone())
            .collect())
    }

    fn read_deps(&self, task: &str) -> Result<Vec<String>, TwError> {
        self.inner
            .lock()
            .unwrap()
            .declarations
            .iter()
            .find(|(n, _)| n == task)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| TwError::TaskNotFound(task.to_string()))
    }

    fn read_raw(&self, task: &str) -> Result<String, TwError> {
        let deps = self.read_deps(task)?;
        Ok(format!("## Dependencies\n{}", deps.join(", ")))
    }
}

impl ResolverAgent for FakeWorkspace {
    async fn rewrite(&self, context: &DeadlockContext) -> Result<(), String> {
        let mut inner = self.inner.lock().unwrap();
        inner.rewrite_contexts.push(context.clone());
        if let Some(reason) = &inner.rewrite_failure {
            return Err(reason.clone());
        }
        let Some(changes) = inner.scripted_rewrites.pop_front() else {
            return Ok(());
        };
        for (task, deps) in changes {
            if let Some(entry) = inner.declarations.iter_mut().find(|(n, _)| *n == task) {
                entry.1 = deps;
            }
        }
        Ok(())
    }
}
