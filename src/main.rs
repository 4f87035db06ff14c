use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use taskweave::agent::{
    install_signal_handlers, is_shutdown_requested, kill_all_children, verify_cli_available,
    CliPhaseRunner, CliResolverAgent,
};
use taskweave::artifacts::{CompletionOracle, FileCompletionOracle};
use taskweave::config::{self, TaskweaveConfig};
use taskweave::lock;
use taskweave::log::parse_log_level;
use taskweave::preflight::{self, PreflightReport};
use taskweave::render::{spawn_renderer, LineRenderer, RendererHandle, DEFAULT_RENDER_INTERVAL};
use taskweave::scheduler::{self, HaltReason, RunParams, ScheduleMode};
use taskweave::state::StateTracker;
use taskweave::store::{load_graph, FileDeclarationStore};
use taskweave::types::{parse_phase_set, AttemptLimit, Phase, PhaseSet};
use taskweave::{log_debug, log_error, log_info, log_warn};

#[derive(Parser)]
#[command(
    name = "taskweave",
    about = "Drive interdependent tasks through plan, implement and review"
)]
struct Cli {
    /// Project root directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to config file (defaults to {root}/taskweave.toml).
    /// When specified, `project.tasks_dir` resolves from the config file's directory.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log verbosity level (error, warn, info, debug)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every pending task through its workflow
    Run {
        /// Comma-separated phases to run (plan,implement,review)
        #[arg(long, conflicts_with = "plan_only")]
        phases: Option<String>,
        /// Only plan; dependency order is ignored
        #[arg(long)]
        plan_only: bool,
        /// Maximum tasks per wave
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        max_concurrency: Option<u64>,
        /// Implement/review iterations per task
        #[arg(long, conflicts_with = "unbounded")]
        max_attempts: Option<u32>,
        /// Remove the per-task attempt cap
        #[arg(long)]
        unbounded: bool,
        /// Print live per-task progress; agent output is folded into it
        #[arg(long)]
        progress: bool,
    },
    /// Show each task's dependencies and artifact state
    Status {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Validate config and the dependency graph without running anything
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match parse_log_level(&cli.log_level) {
        Ok(level) => taskweave::log::set_log_level(level),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }

    let root = &cli.root;
    let (config_path, config_base) = match &cli.config {
        Some(p) => (
            Some(p.clone()),
            p.parent().unwrap_or(Path::new(".")).to_path_buf(),
        ),
        None => (None, root.to_path_buf()),
    };

    let result = match cli.command {
        Commands::Run {
            phases,
            plan_only,
            max_concurrency,
            max_attempts,
            unbounded,
            progress,
        } => {
            let overrides = RunOverrides {
                phases,
                plan_only,
                max_concurrency: max_concurrency.map(|n| n as usize),
                max_attempts,
                unbounded,
                progress,
            };
            handle_run(root, config_path.as_deref(), &config_base, overrides).await
        }
        Commands::Status { json } => handle_status(root, config_path.as_deref(), &config_base, json),
        Commands::Check => handle_check(root, config_path.as_deref(), &config_base),
    };

    if let Err(e) = result {
        log_error!("Error: {}", e);
        std::process::exit(1);
    }
}

struct RunOverrides {
    phases: Option<String>,
    plan_only: bool,
    max_concurrency: Option<usize>,
    max_attempts: Option<u32>,
    unbounded: bool,
    progress: bool,
}

fn resolve_tasks_dir(config_base: &Path, config: &TaskweaveConfig) -> PathBuf {
    config_base.join(&config.project.tasks_dir)
}

fn resolve_phases(overrides: &RunOverrides, config: &TaskweaveConfig) -> Result<PhaseSet, String> {
    if overrides.plan_only {
        return Ok(PhaseSet::only(&[Phase::Plan]));
    }
    match &overrides.phases {
        Some(s) => parse_phase_set(s),
        None => Ok(config.execution.phase_set()),
    }
}

fn resolve_attempts(overrides: &RunOverrides, config: &TaskweaveConfig) -> Result<AttemptLimit, String> {
    if overrides.unbounded {
        return Ok(AttemptLimit::Unbounded);
    }
    match overrides.max_attempts {
        Some(0) => Err("--max-attempts must be >= 1 (use --unbounded to remove the cap)".to_string()),
        Some(n) => Ok(AttemptLimit::Bounded(n)),
        None => Ok(config.execution.attempt_limit()),
    }
}

fn report_diagnostics(report: &PreflightReport, tasks_dir: &Path) {
    for diagnostic in &report.diagnostics {
        log_warn!("{}", diagnostic.to_error(tasks_dir));
    }
}

async fn handle_run(
    root: &Path,
    config_path: Option<&Path>,
    config_base: &Path,
    overrides: RunOverrides,
) -> Result<(), String> {
    install_signal_handlers()?;

    log_info!("--- taskweave ---");
    log_info!("");

    let config = config::load_config_from(config_path, root)?;
    let tasks_dir = resolve_tasks_dir(config_base, &config);

    log_info!("[pre] Acquiring lock...");
    let runtime_dir = root.join(&config.project.runtime_dir);
    let run_lock = lock::RunLock::acquire(&runtime_dir)?;
    log_debug!("Holding {}", run_lock.path().display());

    log_info!("[pre] Running preflight checks...");
    let report = preflight::run_preflight(&config, &tasks_dir).map_err(|errors| {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    report_diagnostics(&report, &tasks_dir);
    log_info!("[pre] Preflight passed ({} tasks).", report.graph.len());

    log_info!("[pre] Verifying {} CLI...", config.agent.cli.display_name());
    verify_cli_available(&config.agent.cli)?;

    let phases = resolve_phases(&overrides, &config)?;
    let max_attempts = resolve_attempts(&overrides, &config)?;
    let max_concurrency = overrides
        .max_concurrency
        .unwrap_or_else(|| config.execution.effective_concurrency());
    let timeout = Duration::from_secs(u64::from(config.execution.phase_timeout_minutes) * 60);

    let tracker = Arc::new(StateTracker::new());
    let runner = Arc::new(CliPhaseRunner {
        tool: config.agent.cli.clone(),
        model: config.agent.model.clone(),
        project_root: root.to_path_buf(),
        tasks_dir: tasks_dir.clone(),
        timeout,
        tracker: Arc::clone(&tracker),
    });
    let agent = CliResolverAgent {
        tool: config.agent.cli.clone(),
        model: config.agent.model.clone(),
        project_root: root.to_path_buf(),
        tasks_dir: tasks_dir.clone(),
        timeout,
    };
    let oracle = Arc::new(FileCompletionOracle::new(&tasks_dir));
    let store = FileDeclarationStore::new(&tasks_dir);

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        loop {
            if is_shutdown_requested() {
                cancel_clone.cancel();
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    });

    scheduler::initialize_tracker(&tracker, &report.graph);
    let renderer = overrides.progress.then(|| {
        spawn_renderer(
            Arc::clone(&tracker),
            LineRenderer::stderr(),
            DEFAULT_RENDER_INTERVAL,
        )
    });

    let params = RunParams {
        max_concurrency,
        phases,
        max_attempts,
        max_resolution_attempts: config.execution.max_resolution_attempts,
        mode: ScheduleMode::for_phases(phases),
        worklog_dir: config
            .execution
            .write_worklog
            .then(|| runtime_dir.join("worklog")),
    };

    let outcome = scheduler::run_scheduler(
        report.graph,
        runner,
        oracle,
        &store,
        &agent,
        Arc::clone(&tracker),
        params,
        cancel,
    )
    .await;
    let summary = finish_run(outcome, renderer).await?;

    log_info!("\n--- Run Summary ---");
    log_info!("Waves: {}", summary.waves.len());
    if !summary.completed.is_empty() {
        log_info!("Completed ({}): {}", summary.completed.len(), summary.completed.join(", "));
    }
    for failed in &summary.failed {
        log_info!("Failed: {} ({})", failed.name, failed.reason);
    }
    if !summary.stuck_pending.is_empty() {
        log_info!(
            "Stuck pending ({}): {}",
            summary.stuck_pending.len(),
            summary.stuck_pending.join(", ")
        );
    }
    if summary.resolutions_attempted > 0 {
        log_info!("Deadlock resolutions attempted: {}", summary.resolutions_attempted);
    }
    match &summary.halt_reason {
        HaltReason::Deadlock(e) => log_info!("Halt reason: deadlock ({})", e),
        other => log_info!("Halt reason: {:?}", other),
    }

    if summary.is_success() {
        Ok(())
    } else {
        Err(format!(
            "{} task(s) failed, {} task(s) left pending",
            summary.failed.len(),
            summary.stuck_pending.len()
        ))
    }
}

#[derive(Serialize)]
struct TaskStatusRow {
    name: String,
    dependencies: Vec<String>,
    planned: bool,
    implemented: bool,
    approved: bool,
}

/// Tear down agents and the renderer whether or not the scheduler succeeded.
async fn finish_run<T, E: std::fmt::Display>(
    outcome: Result<T, E>,
    renderer: Option<RendererHandle>,
) -> Result<T, String> {
    kill_all_children();
    if let Some(renderer) = renderer {
        renderer.stop().await;
    }
    outcome.map_err(|e| e.to_string())
}

fn handle_status(
    root: &Path,
    config_path: Option<&Path>,
    config_base: &Path,
    json: bool,
) -> Result<(), String> {
    let config = config::load_config_from(config_path, root)?;
    let tasks_dir = resolve_tasks_dir(config_base, &config);
    let store = FileDeclarationStore::new(&tasks_dir);
    let oracle = FileCompletionOracle::new(&tasks_dir);
    let graph = load_graph(&store)?;

    let rows: Vec<TaskStatusRow> = graph
        .tasks()
        .map(|t| TaskStatusRow {
            name: t.name.clone(),
            dependencies: t.dependencies.clone(),
            planned: oracle.has_plan(&t.name),
            implemented: oracle.is_implemented(&t.name),
            approved: oracle.is_review_approved(&t.name),
        })
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&rows)
            .map_err(|e| format!("Failed to serialize status: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No tasks in {}.", tasks_dir.display());
        return Ok(());
    }

    let mark = |b: bool| if b { "yes" } else { "-" };
    println!(
        "{:<24} {:<6} {:<6} {:<8} DEPENDENCIES",
        "TASK", "PLAN", "IMPL", "REVIEW"
    );
    println!("{}", "-".repeat(72));
    for row in &rows {
        let deps = if row.dependencies.is_empty() {
            "-".to_string()
        } else {
            row.dependencies.join(", ")
        };
        println!(
            "{:<24} {:<6} {:<6} {:<8} {}",
            row.name,
            mark(row.planned),
            mark(row.implemented),
            mark(row.approved),
            deps
        );
    }

    let done = rows.iter().filter(|r| r.planned && r.implemented && r.approved).count();
    println!("\n{} task(s) total, {} done", rows.len(), done);
    Ok(())
}

fn handle_check(root: &Path, config_path: Option<&Path>, config_base: &Path) -> Result<(), String> {
    let config = config::load_config_from(config_path, root)?;
    let tasks_dir = resolve_tasks_dir(config_base, &config);

    let report = match preflight::run_preflight(&config, &tasks_dir) {
        Ok(report) => report,
        Err(errors) => {
            for e in &errors {
                log_error!("{}", e);
            }
            return Err(format!("{} preflight error(s)", errors.len()));
        }
    };

    if report.diagnostics.is_empty() {
        log_info!("OK: {} task(s), no dependency problems.", report.graph.len());
        return Ok(());
    }

    for diagnostic in &report.diagnostics {
        log_error!("{}", diagnostic.to_error(&tasks_dir));
    }
    Err(format!("{} dependency problem(s)", report.diagnostics.len()))
}
