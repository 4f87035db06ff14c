use crate::agent::ResolverAgent;
use crate::graph::{detect_cycles, TaskGraph};
use crate::store::DeclarationStore;
use crate::tw_error::{format_cycles, DeadlockError};
use crate::types::TaskStatus;
use crate::{log_info, log_warn};

/// Default per-run cap on resolution attempts.
pub const DEFAULT_MAX_RESOLUTION_ATTEMPTS: u32 = 3;

/// One blocked task, as shown to the resolver agent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingTaskContext {
    pub name: String,
    pub dependencies: Vec<String>,
    pub unmet: Vec<String>,
    pub raw_declaration: String,
}

/// Everything the resolver agent needs to repair a stalled graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeadlockContext {
    pub cycles: Vec<Vec<String>>,
    /// `(task, missing dependency)` edges.
    pub dangling: Vec<(String, String)>,
    pub pending: Vec<PendingTaskContext>,
    pub completed: Vec<String>,
}

impl DeadlockContext {
    pub fn blocked(&self) -> Vec<String> {
        self.pending.iter().map(|p| p.name.clone()).collect()
    }
}

/// Gather cycles, dangling edges and each pending task's declaration.
///
/// A declaration that cannot be read is replaced by a placeholder so the agent
/// still sees the task; the reload step will surface the store error.
pub fn build_context(graph: &TaskGraph, store: &impl DeclarationStore) -> DeadlockContext {
    let pending = graph
        .tasks()
        .filter(|t| t.status == TaskStatus::Pending)
        .map(|t| {
            let raw_declaration = match store.read_raw(&t.name) {
                Ok(raw) => raw,
                Err(e) => {
                    log_warn!("[{}] Could not read dependency declaration: {}", t.name, e);
                    format!("(unavailable: {})", e)
                }
            };
            PendingTaskContext {
                name: t.name.clone(),
                dependencies: t.dependencies.clone(),
                unmet: graph.unmet_dependencies(&t.name),
                raw_declaration,
            }
        })
        .collect();

    DeadlockContext {
        cycles: detect_cycles(graph),
        dangling: graph.dangling_dependencies(),
        pending,
        completed: graph.completed_names(),
    }
}

/// Repairs a deadlocked graph by delegating declaration edits to an agent.
///
/// Each call to [`resolve`](Self::resolve) is one attempt: one agent call, one
/// reload, one cycle check. Attempts are counted across the whole run.
pub struct DeadlockResolver<'a, S, A> {
    store: &'a S,
    agent: &'a A,
    max_attempts: u32,
    attempts: u32,
}

impl<'a, S: DeclarationStore, A: ResolverAgent> DeadlockResolver<'a, S, A> {
    pub fn new(store: &'a S, agent: &'a A, max_attempts: u32) -> Self {
        Self {
            store,
            agent,
            max_attempts,
            attempts: 0,
        }
    }

    /// Attempts made so far in this run.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn resolve(&mut self, graph: &TaskGraph) -> Result<TaskGraph, DeadlockError> {
        let blocked = graph.pending_names();
        if self.attempts >= self.max_attempts {
            return Err(DeadlockError::AttemptsExhausted {
                attempts: self.attempts,
                blocked,
            });
        }
        self.attempts += 1;

        let context = build_context(graph, self.store);
        log_info!(
            "Deadlock: {} pending task(s) blocked, {} cycle(s), {} missing dependency edge(s) (resolution attempt {}/{})",
            blocked.len(),
            context.cycles.len(),
            context.dangling.len(),
            self.attempts,
            self.max_attempts
        );
        if !context.cycles.is_empty() {
            log_info!("Cycles: {}", format_cycles(&context.cycles));
        }

        self.agent
            .rewrite(&context)
            .await
            .map_err(|reason| DeadlockError::AgentFailed {
                reason,
                blocked: blocked.clone(),
            })?;

        let rebuilt = graph
            .rebuild_pending(|name| self.store.read_deps(name))
            .map_err(|e| DeadlockError::ReloadFailed {
                reason: e.to_string(),
                blocked: blocked.clone(),
            })?;

        let remaining = detect_cycles(&rebuilt);
        if !remaining.is_empty() {
            log_warn!(
                "Resolution left {} cycle(s): {}",
                remaining.len(),
                format_cycles(&remaining)
            );
            return Err(DeadlockError::CyclesRemain {
                cycles: remaining,
                blocked: rebuilt.pending_names(),
            });
        }

        log_info!("Resolution succeeded; rebuilt graph has no cycles");
        Ok(rebuilt)
    }
}
