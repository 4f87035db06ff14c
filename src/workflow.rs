use crate::agent::PhaseRunner;
use crate::artifacts::CompletionOracle;
use crate::state::{StateTracker, UpdateOutcome};
use crate::tw_error::WorkflowError;
use crate::types::{AttemptLimit, Phase, PhaseSet};
use crate::{log_debug, log_info};

/// Which phases a workflow may run, and how many loop iterations it gets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkflowOptions {
    pub phases: PhaseSet,
    pub max_attempts: AttemptLimit,
}

/// Position of a task in its plan → implement → review cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkflowState {
    NeedsPlan,
    Planned,
    Implementing { attempt: u32 },
    Reviewing { attempt: u32 },
    Approved,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Approved | WorkflowState::Failed)
    }
}

/// What a successful workflow did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowReport {
    /// Phase runner invocations made by this workflow.
    pub invocations: u32,
    /// Every predicate already held on entry, so nothing ran.
    pub resumed: bool,
    pub history: Vec<WorkflowState>,
}

/// Bounded-retry state machine driving one task through its phases.
pub struct TaskWorkflow<'a, R, O> {
    task: &'a str,
    runner: &'a R,
    oracle: &'a O,
    tracker: &'a StateTracker,
    options: WorkflowOptions,
    state: WorkflowState,
    history: Vec<WorkflowState>,
    invocations: u32,
}

impl<'a, R: PhaseRunner, O: CompletionOracle> TaskWorkflow<'a, R, O> {
    pub fn new(
        task: &'a str,
        runner: &'a R,
        oracle: &'a O,
        tracker: &'a StateTracker,
        options: WorkflowOptions,
    ) -> Self {
        Self {
            task,
            runner,
            oracle,
            tracker,
            options,
            state: WorkflowState::NeedsPlan,
            history: vec![WorkflowState::NeedsPlan],
            invocations: 0,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    fn transition(&mut self, next: WorkflowState) {
        log_debug!("[{}] {:?} → {:?}", self.task, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    fn publish_step(&self, step: &str) {
        if self.tracker.update_step(self.task, Some(step)) == UpdateOutcome::UnknownTask {
            log_debug!("[{}] Step update ignored: task not tracked", self.task);
        }
    }

    fn step_label(&self, phase: Phase, attempt: Option<u32>) -> String {
        match (attempt, self.options.max_attempts) {
            (None, _) => phase.label().to_string(),
            (Some(n), AttemptLimit::Bounded(max)) => {
                format!("{} (attempt {}/{})", phase.label(), n, max)
            }
            (Some(n), AttemptLimit::Unbounded) => format!("{} (attempt {})", phase.label(), n),
        }
    }

    async fn invoke(&mut self, phase: Phase, attempt: Option<u32>) -> Result<(), WorkflowError> {
        let step = self.step_label(phase, attempt);
        self.publish_step(&step);
        log_info!("[{}][{}] {}", self.task, phase.as_str().to_uppercase(), step);

        self.invocations += 1;
        if let Err(e) = self.runner.run(self.task, phase).await {
            self.transition(WorkflowState::Failed);
            return Err(e.into());
        }
        Ok(())
    }

    fn fail(&mut self, error: WorkflowError) -> Result<WorkflowReport, WorkflowError> {
        self.transition(WorkflowState::Failed);
        Err(error)
    }

    fn approve(&mut self, resumed: bool) -> Result<WorkflowReport, WorkflowError> {
        self.transition(WorkflowState::Approved);
        self.publish_step("Approved");
        Ok(WorkflowReport {
            invocations: self.invocations,
            resumed,
            history: self.history.clone(),
        })
    }

    /// Drive the task to `Approved`, or fail with the reason it cannot get there.
    ///
    /// Completion predicates are re-read before every decision, so a task whose
    /// artifacts already exist (e.g. from an earlier run) skips straight through.
    pub async fn run(&mut self) -> Result<WorkflowReport, WorkflowError> {
        let task = self.task;
        let phases = self.options.phases;

        if self.oracle.is_fully_done(task) {
            log_info!("[{}] Already planned, implemented and approved", task);
            return self.approve(true);
        }

        // Planning
        if !self.oracle.has_plan(task) && phases.contains(Phase::Plan) {
            self.invoke(Phase::Plan, None).await?;
        }
        self.transition(WorkflowState::Planned);

        if !phases.contains(Phase::Implement) && !phases.contains(Phase::Review) {
            return self.approve(false);
        }

        // Implement / review loop. Each iteration re-reads the predicates and
        // makes at most one runner call; the budget counts those iterations.
        let mut attempt: u32 = 0;
        loop {
            let phase = if !self.oracle.is_implemented(task) {
                if !phases.contains(Phase::Implement) {
                    return self.fail(WorkflowError::PhaseNotEnabled {
                        task: task.to_string(),
                        phase: Phase::Implement,
                    });
                }
                Phase::Implement
            } else if phases.contains(Phase::Review) && !self.oracle.is_review_approved(task) {
                Phase::Review
            } else {
                break;
            };

            attempt += 1;
            if !self.options.max_attempts.allows(attempt) {
                return self.fail(WorkflowError::MaxAttemptsExceeded {
                    task: task.to_string(),
                    attempts: attempt - 1,
                });
            }

            let next = match phase {
                Phase::Review => WorkflowState::Reviewing { attempt },
                _ => WorkflowState::Implementing { attempt },
            };
            self.transition(next);
            self.invoke(phase, Some(attempt)).await?;
        }

        self.approve(false)
    }
}

/// Run a fresh [`TaskWorkflow`] for `task`.
pub async fn run_workflow(
    task: &str,
    runner: &impl PhaseRunner,
    oracle: &impl CompletionOracle,
    tracker: &StateTracker,
    options: WorkflowOptions,
) -> Result<WorkflowReport, WorkflowError> {
    TaskWorkflow::new(task, runner, oracle, tracker, options)
        .run()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockPhaseRunner;

    struct Fixed(bool, bool, bool);

    impl CompletionOracle for Fixed {
        fn has_plan(&self, _task: &str) -> bool {
            self.0
        }
        fn is_implemented(&self, _task: &str) -> bool {
            self.1
        }
        fn is_review_approved(&self, _task: &str) -> bool {
            self.2
        }
    }

    #[tokio::test]
    async fn step_label_shows_attempt_budget() {
        let runner = MockPhaseRunner::new();
        let oracle = Fixed(true, true, true);
        let tracker = StateTracker::new();
        let workflow = TaskWorkflow::new("A", &runner, &oracle, &tracker, WorkflowOptions::default());
        assert_eq!(
            workflow.step_label(Phase::Implement, Some(3)),
            "Implementing (attempt 3/20)"
        );
        assert_eq!(workflow.step_label(Phase::Plan, None), "Planning");
    }
}
