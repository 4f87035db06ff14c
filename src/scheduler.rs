use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::agent::{PhaseRunner, ResolverAgent};
use crate::artifacts::CompletionOracle;
use crate::graph::TaskGraph;
use crate::resolver::{DeadlockResolver, DEFAULT_MAX_RESOLUTION_ATTEMPTS};
use crate::state::StateTracker;
use crate::store::DeclarationStore;
use crate::tw_error::{DeadlockError, TwError, WorkflowError};
use crate::types::{AttemptLimit, PhaseSet, TaskStatus};
use crate::workflow::{run_workflow, WorkflowOptions, WorkflowReport};
use crate::worklog;
use crate::{log_debug, log_info, log_warn};

// --- Public types ---

/// How waves are formed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleMode {
    /// A task is eligible once every dependency has completed.
    DependencyGated,
    /// Dependency edges are ignored; every pending task is eligible.
    PlanningOnly,
}

impl ScheduleMode {
    /// Planning needs no sibling artifacts, so a plan-only run ignores edges.
    pub fn for_phases(phases: PhaseSet) -> Self {
        if phases.is_planning_only() {
            ScheduleMode::PlanningOnly
        } else {
            ScheduleMode::DependencyGated
        }
    }
}

/// Parameters for one scheduler run.
#[derive(Clone, Debug)]
pub struct RunParams {
    pub max_concurrency: usize,
    pub phases: PhaseSet,
    pub max_attempts: AttemptLimit,
    pub max_resolution_attempts: u32,
    pub mode: ScheduleMode,
    /// Append one worklog entry per task outcome when set.
    pub worklog_dir: Option<PathBuf>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_concurrency: crate::config::default_max_concurrency(),
            phases: PhaseSet::all(),
            max_attempts: AttemptLimit::default(),
            max_resolution_attempts: DEFAULT_MAX_RESOLUTION_ATTEMPTS,
            mode: ScheduleMode::DependencyGated,
            worklog_dir: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// No task is pending or running.
    AllSettled,
    /// Deadlock resolution failed; the run was aborted.
    Deadlock(DeadlockError),
    ShutdownRequested,
}

/// A task that ended in `Failed`, with the recorded reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedTask {
    pub name: String,
    pub reason: String,
}

/// Result of a scheduler run, returned to the caller for summary display.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub failed: Vec<FailedTask>,
    /// Tasks still pending when the run stopped.
    pub stuck_pending: Vec<String>,
    /// Task names launched together, in launch order.
    pub waves: Vec<Vec<String>>,
    pub resolutions_attempted: u32,
    pub halt_reason: HaltReason,
}

impl RunSummary {
    /// A run succeeds only if it settled with nothing failed or left behind.
    pub fn is_success(&self) -> bool {
        self.halt_reason == HaltReason::AllSettled
            && self.failed.is_empty()
            && self.stuck_pending.is_empty()
    }

    pub fn failed_names(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.name.clone()).collect()
    }
}

// --- Wave selection ---

/// Pick the next wave: eligible tasks in graph order, at most `width - running`.
pub fn select_wave(graph: &TaskGraph, width: usize, mode: ScheduleMode) -> Vec<String> {
    let running = graph.running_names();
    let available = width.saturating_sub(running.len());

    let candidates: Vec<String> = match mode {
        ScheduleMode::DependencyGated => graph
            .ready_tasks()
            .into_iter()
            .map(|t| t.name.clone())
            .collect(),
        ScheduleMode::PlanningOnly => graph.pending_names(),
    };

    candidates
        .into_iter()
        .filter(|name| !running.contains(name))
        .take(available)
        .collect()
}

/// Mark pending tasks that can no longer run because a dependency failed.
///
/// Returns the newly failed tasks in graph order.
pub fn propagate_failures(graph: &mut TaskGraph) -> Result<Vec<FailedTask>, TwError> {
    let mut newly_failed = Vec::new();
    loop {
        let doomed: Vec<(String, String)> = graph
            .pending_names()
            .into_iter()
            .filter_map(|name| graph.failed_ancestor(&name).map(|dep| (name, dep)))
            .collect();
        if doomed.is_empty() {
            return Ok(newly_failed);
        }
        for (name, dep) in doomed {
            graph.set_status(&name, TaskStatus::Failed)?;
            newly_failed.push(FailedTask {
                name,
                reason: format!("dependency {} failed", dep),
            });
        }
    }
}

/// Seed `tracker` with every task in `graph`. Call once per run, before any
/// renderer is started and before [`run_scheduler`].
pub fn initialize_tracker(tracker: &StateTracker, graph: &TaskGraph) {
    tracker.initialize(
        graph
            .tasks()
            .map(|t| (t.name.clone(), t.status))
            .collect::<Vec<_>>(),
    );
}

// --- Main loop ---

type WaveResult = (String, Result<WorkflowReport, WorkflowError>);
type WaveOutcomes = HashMap<String, Result<WorkflowReport, String>>;

/// Main scheduler loop.
///
/// 1. Select a wave of eligible tasks (bounded by `max_concurrency`)
/// 2. Mark them running, spawn one workflow per task into a `JoinSet`
/// 3. Await the whole wave; record each outcome without failing siblings
/// 4. Fail pending tasks downstream of a failure
/// 5. On an empty wave with pending tasks, run deadlock resolution
/// 6. Loop until nothing is pending, resolution fails, or shutdown
///
/// `tracker` must already be initialized (see [`initialize_tracker`]).
#[allow(clippy::too_many_arguments)]
pub async fn run_scheduler<R, O, S, A>(
    mut graph: TaskGraph,
    runner: Arc<R>,
    oracle: Arc<O>,
    store: &S,
    agent: &A,
    tracker: Arc<StateTracker>,
    params: RunParams,
    cancel: CancellationToken,
) -> Result<RunSummary, TwError>
where
    R: PhaseRunner + 'static,
    O: CompletionOracle + 'static,
    S: DeclarationStore,
    A: ResolverAgent,
{
    let width = params.max_concurrency.max(1);
    let options = WorkflowOptions {
        phases: params.phases,
        max_attempts: params.max_attempts,
    };
    let mut resolver = DeadlockResolver::new(store, agent, params.max_resolution_attempts);
    let mut failed: Vec<FailedTask> = Vec::new();
    let mut waves: Vec<Vec<String>> = Vec::new();

    log_info!(
        "Scheduler started ({} tasks, max_concurrency={}, phases={}, attempts={}).",
        graph.len(),
        width,
        params.phases,
        params.max_attempts
    );

    let halt_reason = loop {
        if cancel.is_cancelled() {
            log_info!("Shutdown requested; not starting another wave.");
            break HaltReason::ShutdownRequested;
        }

        let wave = select_wave(&graph, width, params.mode);

        if wave.is_empty() {
            if graph.pending_names().is_empty() {
                log_info!("All tasks settled.");
                break HaltReason::AllSettled;
            }
            match resolver.resolve(&graph).await {
                Ok(rebuilt) => {
                    graph = rebuilt;
                    // a rewrite may point pending tasks at one that already failed
                    if params.mode == ScheduleMode::DependencyGated {
                        fail_downstream(&mut graph, &tracker, &params, &mut failed)?;
                    }
                    continue;
                }
                Err(e) => {
                    log_warn!("Deadlock resolution failed: {}", e);
                    break HaltReason::Deadlock(e);
                }
            }
        }

        log_info!("\nWave {}: [{}]", waves.len() + 1, wave.join(", "));
        for name in &wave {
            graph.set_status(name, TaskStatus::Running)?;
            tracker.update_status(name, TaskStatus::Running);
        }

        let mut outcomes = run_wave(&wave, &runner, &oracle, &tracker, options).await;

        for name in &wave {
            let result = outcomes
                .remove(name)
                .unwrap_or_else(|| Err("workflow task panicked".to_string()));
            match result {
                Ok(report) => {
                    graph.set_status(name, TaskStatus::Completed)?;
                    tracker.update_status(name, TaskStatus::Completed);
                    log_info!(
                        "[{}] Completed ({} phase run(s){})",
                        name,
                        report.invocations,
                        if report.resumed { ", already done" } else { "" }
                    );
                    record_worklog(&params, name, TaskStatus::Completed, "approved");
                }
                Err(reason) => {
                    graph.set_status(name, TaskStatus::Failed)?;
                    tracker.update_status(name, TaskStatus::Failed);
                    tracker.update_message(name, Some(&reason));
                    log_warn!("[{}] Failed: {}", name, reason);
                    record_worklog(&params, name, TaskStatus::Failed, &reason);
                    failed.push(FailedTask {
                        name: name.clone(),
                        reason,
                    });
                }
            }
        }

        if params.mode == ScheduleMode::DependencyGated {
            fail_downstream(&mut graph, &tracker, &params, &mut failed)?;
        }

        waves.push(wave);
    };

    let summary = RunSummary {
        completed: graph.completed_names(),
        failed,
        stuck_pending: graph.pending_names(),
        waves,
        resolutions_attempted: resolver.attempts(),
        halt_reason,
    };
    log_info!(
        "Run finished: {} completed, {} failed, {} pending.",
        summary.completed.len(),
        summary.failed.len(),
        summary.stuck_pending.len()
    );
    Ok(summary)
}

/// Launch one workflow per task and wait for every one of them.
///
/// A workflow that panics has no entry in the returned map.
async fn run_wave<R, O>(
    wave: &[String],
    runner: &Arc<R>,
    oracle: &Arc<O>,
    tracker: &Arc<StateTracker>,
    options: WorkflowOptions,
) -> WaveOutcomes
where
    R: PhaseRunner + 'static,
    O: CompletionOracle + 'static,
{
    let mut join_set: JoinSet<WaveResult> = JoinSet::new();

    for name in wave {
        let name = name.clone();
        let runner = Arc::clone(runner);
        let oracle = Arc::clone(oracle);
        let tracker = Arc::clone(tracker);
        join_set.spawn(async move {
            let result =
                run_workflow(&name, runner.as_ref(), oracle.as_ref(), &tracker, options).await;
            (name, result)
        });
    }

    let mut outcomes = HashMap::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((name, result)) => {
                outcomes.insert(name, result.map_err(|e| e.to_string()));
            }
            Err(e) => {
                log_debug!("Task join error: {}", e);
            }
        }
    }
    outcomes
}

/// Run [`propagate_failures`] and record each newly failed task.
fn fail_downstream(
    graph: &mut TaskGraph,
    tracker: &StateTracker,
    params: &RunParams,
    failed: &mut Vec<FailedTask>,
) -> Result<(), TwError> {
    for task in propagate_failures(graph)? {
        tracker.update_status(&task.name, TaskStatus::Failed);
        tracker.update_message(&task.name, Some(&task.reason));
        log_warn!("[{}] Failed: {}", task.name, task.reason);
        record_worklog(params, &task.name, TaskStatus::Failed, &task.reason);
        failed.push(task);
    }
    Ok(())
}

fn record_worklog(params: &RunParams, task: &str, status: TaskStatus, detail: &str) {
    if let Some(dir) = &params.worklog_dir {
        if let Err(e) = worklog::write_entry(dir, task, status, detail) {
            log_warn!("Warning: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_wave_respects_width_and_order() {
        let graph = TaskGraph::from_declarations(vec![
            ("A", Vec::<&str>::new()),
            ("B", vec![]),
            ("C", vec![]),
        ])
        .unwrap();
        assert_eq!(
            select_wave(&graph, 2, ScheduleMode::DependencyGated),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn planning_only_ignores_edges() {
        let graph =
            TaskGraph::from_declarations(vec![("A", vec!["B"]), ("B", vec!["A"])]).unwrap();
        assert!(select_wave(&graph, 5, ScheduleMode::DependencyGated).is_empty());
        assert_eq!(select_wave(&graph, 5, ScheduleMode::PlanningOnly).len(), 2);
    }
}
