use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::CliTool;
use crate::prompt;
use crate::resolver::DeadlockContext;
use crate::state::StateTracker;
use crate::tw_error::RunnerError;
use crate::types::Phase;
use crate::{log_debug, log_warn};

/// Maximum time to wait for graceful shutdown after SIGTERM before sending SIGKILL.
const SIGTERM_GRACE_PERIOD_SECONDS: u64 = 5;

/// Polling interval when waiting for a process group to exit after SIGTERM.
const KILL_POLL_INTERVAL_MS: u64 = 100;

// --- Collaborator traits ---

/// Executes one workflow phase for one task.
pub trait PhaseRunner: Send + Sync {
    fn run(
        &self,
        task: &str,
        phase: Phase,
    ) -> impl Future<Output = Result<(), RunnerError>> + Send;
}

/// External agent that rewrites dependency declarations to break a deadlock.
pub trait ResolverAgent: Send + Sync {
    fn rewrite(&self, context: &DeadlockContext)
        -> impl Future<Output = Result<(), String>> + Send;
}

// --- Shutdown flag ---

fn shutdown_flag() -> &'static Arc<AtomicBool> {
    static FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    FLAG.get_or_init(|| Arc::new(AtomicBool::new(false)))
}

pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Route SIGTERM and SIGINT into the shutdown flag. Safe to call more than once.
pub fn install_signal_handlers() -> Result<(), String> {
    let flag = Arc::clone(shutdown_flag());
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&flag))
        .map_err(|e| format!("Failed to register SIGTERM handler: {}", e))?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag)
        .map_err(|e| format!("Failed to register SIGINT handler: {}", e))?;
    Ok(())
}

// --- Process registry ---

/// Process groups of agent subprocesses that are still running.
fn process_registry() -> &'static std::sync::Mutex<HashSet<Pid>> {
    static REGISTRY: OnceLock<std::sync::Mutex<HashSet<Pid>>> = OnceLock::new();
    REGISTRY.get_or_init(|| std::sync::Mutex::new(HashSet::new()))
}

fn register_child(pgid: Pid) {
    if let Ok(mut registry) = process_registry().lock() {
        registry.insert(pgid);
    }
}

fn unregister_child(pgid: Pid) {
    if let Ok(mut registry) = process_registry().lock() {
        registry.remove(&pgid);
    }
}

/// Number of agent process groups currently registered.
pub fn active_child_count() -> usize {
    process_registry().lock().map(|r| r.len()).unwrap_or(0)
}

/// SIGTERM every registered process group, wait the grace period, SIGKILL survivors.
pub fn kill_all_children() {
    use nix::sys::signal::{killpg, Signal};

    let pgids: Vec<Pid> = {
        let Ok(registry) = process_registry().lock() else {
            return;
        };
        registry.iter().copied().collect()
    };

    if pgids.is_empty() {
        return;
    }

    for &pgid in &pgids {
        let _ = killpg(pgid, Signal::SIGTERM);
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(SIGTERM_GRACE_PERIOD_SECONDS);
    while std::time::Instant::now() < deadline {
        let all_gone = pgids
            .iter()
            .all(|&pgid| matches!(killpg(pgid, None), Err(nix::errno::Errno::ESRCH)));
        if all_gone {
            break;
        }
        std::thread::sleep(Duration::from_millis(KILL_POLL_INTERVAL_MS));
    }

    for &pgid in &pgids {
        let _ = killpg(pgid, Signal::SIGKILL);
    }

    if let Ok(mut registry) = process_registry().lock() {
        registry.clear();
    }
}

// --- Subprocess execution ---

/// Where an agent subprocess's stdout goes.
pub enum AgentOutput {
    /// Share the parent's terminal.
    Inherit,
    /// Pipe stdout and publish each non-empty line as the task's last message.
    Track {
        tracker: Arc<StateTracker>,
        task: String,
    },
}

impl AgentOutput {
    /// Track when a live renderer owns the terminal, inherit otherwise.
    pub fn for_task(tracker: &Arc<StateTracker>, task: &str) -> Self {
        if tracker.is_renderer_active() {
            AgentOutput::Track {
                tracker: Arc::clone(tracker),
                task: task.to_string(),
            }
        } else {
            AgentOutput::Inherit
        }
    }
}

/// Spawn an agent subprocess in its own process group and wait for it.
///
/// Succeeds only on a zero exit status. Timeouts kill the whole process group.
/// A shutdown signal received while the agent ran is reported as an error.
pub async fn run_subprocess_agent(
    mut cmd: tokio::process::Command,
    timeout: Duration,
    output: AgentOutput,
) -> Result<(), String> {
    // stdin must be null: in its own process group the child would get SIGTTIN on read
    cmd.stdin(std::process::Stdio::null());
    match output {
        AgentOutput::Inherit => {
            cmd.stdout(std::process::Stdio::inherit());
            cmd.stderr(std::process::Stdio::inherit());
        }
        AgentOutput::Track { .. } => {
            cmd.stdout(std::process::Stdio::piped());
            cmd.stderr(std::process::Stdio::null());
        }
    }
    cmd.kill_on_drop(true);

    // SAFETY: pre_exec runs between fork() and exec() where only async-signal-safe
    // functions are permitted. setpgid is async-signal-safe per POSIX.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(std::io::Error::other)?;
            Ok(())
        });
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| format!("Failed to spawn agent: {}", e))?;

    let child_pid = child
        .id()
        .ok_or_else(|| "Failed to get agent PID".to_string())? as i32;
    let pgid = Pid::from_raw(child_pid);
    register_child(pgid);
    log_debug!("[agent] Spawned pid={} (timeout={}s)", child_pid, timeout.as_secs());

    let reader = match (output, child.stdout.take()) {
        (AgentOutput::Track { tracker, task }, Some(stdout)) => Some(tokio::spawn(async move {
            // Drain to EOF even when a line is not UTF-8; a closed pipe would SIGPIPE the agent.
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim();
                        if !line.is_empty() {
                            tracker.update_message(&task, Some(line));
                        }
                    }
                    Err(e) => {
                        log_debug!("[{}] Agent output read failed: {}", task, e);
                        break;
                    }
                }
            }
        })),
        _ => None,
    };

    let wait_result = tokio::time::timeout(timeout, child.wait()).await;

    let result = match wait_result {
        Err(_) => {
            log_debug!("[agent] Timeout after {}s, killing pgid={}", timeout.as_secs(), child_pid);
            kill_process_group(child_pid).await;
            let _ = child.wait().await;
            Err(format!("Agent timed out after {} seconds", timeout.as_secs()))
        }
        Ok(Err(e)) => Err(format!("Error waiting for agent: {}", e)),
        Ok(Ok(status)) => {
            log_debug!("[agent] Exited pid={} status={:?}", child_pid, status.code());
            if is_shutdown_requested() {
                kill_process_group(child_pid).await;
                Err("Shutdown requested".to_string())
            } else if status.success() {
                Ok(())
            } else {
                Err(format!("Agent exited with status {:?}", status.code()))
            }
        }
    };

    unregister_child(pgid);
    if let Some(handle) = reader {
        let _ = handle.await;
    }
    result
}

/// SIGTERM a process group, poll for exit, then SIGKILL. Runs on the blocking pool.
async fn kill_process_group(pgid: i32) {
    tokio::task::spawn_blocking(move || {
        use nix::sys::signal::{killpg, Signal};

        let pgid = Pid::from_raw(pgid);
        if let Err(nix::errno::Errno::ESRCH) = killpg(pgid, Signal::SIGTERM) {
            return;
        }

        let deadline =
            std::time::Instant::now() + Duration::from_secs(SIGTERM_GRACE_PERIOD_SECONDS);
        while std::time::Instant::now() < deadline {
            match killpg(pgid, None) {
                Err(nix::errno::Errno::ESRCH) => return,
                _ => std::thread::sleep(Duration::from_millis(KILL_POLL_INTERVAL_MS)),
            }
        }

        let _ = killpg(pgid, Signal::SIGKILL);
    })
    .await
    .unwrap_or_else(|e| log_warn!("kill_process_group task panicked: {}", e));
}

// --- CLI implementations ---

/// Verify that `tool` is installed and answers `--version`.
pub fn verify_cli_available(tool: &CliTool) -> Result<(), String> {
    let output = std::process::Command::new(tool.binary_name())
        .args(tool.version_args())
        .output()
        .map_err(|e| {
            format!(
                "{} not found on PATH. {} ({})",
                tool.display_name(),
                tool.install_hint(),
                e
            )
        })?;

    if !output.status.success() {
        return Err(format!(
            "{} found but `{} {}` failed",
            tool.display_name(),
            tool.binary_name(),
            tool.version_args().join(" ")
        ));
    }
    Ok(())
}

/// Runs each phase by prompting a CLI coding agent inside the project root.
pub struct CliPhaseRunner {
    pub tool: CliTool,
    pub model: Option<String>,
    pub project_root: PathBuf,
    pub tasks_dir: PathBuf,
    pub timeout: Duration,
    pub tracker: Arc<StateTracker>,
}

impl PhaseRunner for CliPhaseRunner {
    async fn run(&self, task: &str, phase: Phase) -> Result<(), RunnerError> {
        let task_dir = self.tasks_dir.join(task);
        let prompt = prompt::build_phase_prompt(task, phase, &task_dir);

        let mut cmd = tokio::process::Command::new(self.tool.binary_name());
        cmd.args(self.tool.build_args(&prompt, self.model.as_deref()));
        cmd.current_dir(&self.project_root);

        let output = AgentOutput::for_task(&self.tracker, task);
        run_subprocess_agent(cmd, self.timeout, output)
            .await
            .map_err(|reason| RunnerError::new(task, phase, reason))
    }
}

/// Asks a CLI coding agent to edit dependency declarations in place.
pub struct CliResolverAgent {
    pub tool: CliTool,
    pub model: Option<String>,
    pub project_root: PathBuf,
    pub tasks_dir: PathBuf,
    pub timeout: Duration,
}

impl ResolverAgent for CliResolverAgent {
    async fn rewrite(&self, context: &DeadlockContext) -> Result<(), String> {
        let prompt = prompt::build_resolution_prompt(context, &self.tasks_dir);

        let mut cmd = tokio::process::Command::new(self.tool.binary_name());
        cmd.args(self.tool.build_args(&prompt, self.model.as_deref()));
        cmd.current_dir(&self.project_root);

        run_subprocess_agent(cmd, self.timeout, AgentOutput::Inherit).await
    }
}

// --- Mock ---

/// Phase runner for pipeline tests.
///
/// Records every invocation, fails the `(task, phase)` pairs it was told to,
/// and tracks how many runs overlapped.
#[derive(Default)]
pub struct MockPhaseRunner {
    calls: std::sync::Mutex<Vec<(String, Phase)>>,
    failures: HashMap<(String, Phase), String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPhaseRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every `phase` run for `task` with `reason`.
    pub fn failing(mut self, task: &str, phase: Phase, reason: &str) -> Self {
        self.failures
            .insert((task.to_string(), phase), reason.to_string());
        self
    }

    /// Hold each run for `delay` so overlapping runs are observable.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<(String, Phase)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, task: &str, phase: Phase) -> usize {
        self.calls()
            .iter()
            .filter(|(t, p)| t == task && *p == phase)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl PhaseRunner for MockPhaseRunner {
    async fn run(&self, task: &str, phase: Phase) -> Result<(), RunnerError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((task.to_string(), phase));
        }
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match self.failures.get(&(task.to_string(), phase)) {
            Some(reason) => Err(RunnerError::new(task, phase, reason.clone())),
            None => Ok(()),
        }
    }
}
