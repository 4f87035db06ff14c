use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::types::{AttemptLimit, Phase, PhaseSet, DEFAULT_MAX_ATTEMPTS};

pub const CONFIG_FILE_NAME: &str = "taskweave.toml";

/// Hard ceiling for the default concurrency width.
const DEFAULT_CONCURRENCY_CEILING: usize = 5;

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TaskweaveConfig {
    pub project: ProjectConfig,
    pub execution: ExecutionConfig,
    pub agent: AgentConfig,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ProjectConfig {
    /// Directory holding one subdirectory per task (relative to the config base).
    pub tasks_dir: String,
    /// Lock, worklog and scratch files (relative to the project root).
    pub runtime_dir: String,
}

#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// `None` means `min(5, 2 × available cores)`.
    pub max_concurrency: Option<usize>,
    pub max_attempts: u32,
    pub unbounded_attempts: bool,
    pub phase_timeout_minutes: u32,
    pub max_resolution_attempts: u32,
    pub phases: Vec<Phase>,
    pub write_worklog: bool,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CliTool {
    #[default]
    Claude,
    Codex,
    OpenCode,
}

#[derive(Default, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub cli: CliTool,
    pub model: Option<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            tasks_dir: "tasks".to_string(),
            runtime_dir: ".taskweave".to_string(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            unbounded_attempts: false,
            phase_timeout_minutes: 30,
            max_resolution_attempts: 3,
            phases: Phase::ALL.to_vec(),
            write_worklog: true,
        }
    }
}

impl ExecutionConfig {
    pub fn attempt_limit(&self) -> AttemptLimit {
        if self.unbounded_attempts {
            AttemptLimit::Unbounded
        } else {
            AttemptLimit::Bounded(self.max_attempts)
        }
    }

    pub fn phase_set(&self) -> PhaseSet {
        PhaseSet::only(&self.phases)
    }

    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or_else(default_max_concurrency)
    }
}

/// `min(5, 2 × available cores)`, never below 1.
pub fn default_max_concurrency() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cores * 2).clamp(1, DEFAULT_CONCURRENCY_CEILING)
}

impl CliTool {
    pub fn binary_name(&self) -> &'static str {
        match self {
            CliTool::Claude => "claude",
            CliTool::Codex => "codex",
            CliTool::OpenCode => "opencode",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CliTool::Claude => "Claude CLI",
            CliTool::Codex => "Codex CLI",
            CliTool::OpenCode => "OpenCode CLI",
        }
    }

    pub fn version_args(&self) -> &'static [&'static str] {
        &["--version"]
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            CliTool::Claude => "Install with `npm install -g @anthropic-ai/claude-code`",
            CliTool::Codex => "Install with `npm install -g @openai/codex`",
            CliTool::OpenCode => "Install with `npm install -g opencode-ai`",
        }
    }

    /// Arguments for a non-interactive, single-prompt invocation.
    pub fn build_args(&self, prompt: &str, model: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = match self {
            CliTool::Claude => vec![
                "--dangerously-skip-permissions".to_string(),
                "-p".to_string(),
                prompt.to_string(),
            ],
            CliTool::Codex => vec![
                "exec".to_string(),
                "--full-auto".to_string(),
                prompt.to_string(),
            ],
            CliTool::OpenCode => vec!["run".to_string(), prompt.to_string()],
        };
        if let Some(model) = model {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        args
    }
}

pub fn validate(config: &TaskweaveConfig) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.execution.max_concurrency == Some(0) {
        errors.push("execution.max_concurrency must be >= 1".to_string());
    }

    if !config.execution.unbounded_attempts && config.execution.max_attempts < 1 {
        errors.push(
            "execution.max_attempts must be >= 1 (set unbounded_attempts = true to remove the cap)"
                .to_string(),
        );
    }

    if config.execution.phase_timeout_minutes < 1 {
        errors.push("execution.phase_timeout_minutes must be >= 1".to_string());
    }

    if config.execution.phases.is_empty() {
        errors.push("execution.phases must enable at least one phase".to_string());
    }

    if config.project.tasks_dir.trim().is_empty() {
        errors.push("project.tasks_dir must not be empty".to_string());
    }

    if config.project.runtime_dir.trim().is_empty() {
        errors.push("project.runtime_dir must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Load `{project_root}/taskweave.toml`, or defaults if the file is absent.
pub fn load_config(project_root: &Path) -> Result<TaskweaveConfig, String> {
    load_config_from(None, project_root)
}

/// Load from an explicit path when given, else from the project root.
pub fn load_config_from(
    config_path: Option<&Path>,
    project_root: &Path,
) -> Result<TaskweaveConfig, String> {
    let path: PathBuf = match config_path {
        Some(p) => p.to_path_buf(),
        None => project_root.join(CONFIG_FILE_NAME),
    };

    if !path.exists() {
        if config_path.is_some() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return Ok(TaskweaveConfig::default());
    }

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    let config: TaskweaveConfig = toml::from_str(&contents)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;

    validate(&config).map_err(|errors| {
        format!(
            "Config validation failed:\n{}",
            errors
                .iter()
                .map(|e| format!("  - {}", e))
                .collect::<Vec<_>>()
                .join("\n")
        )
    })?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_concurrency_is_within_bounds() {
        let width = default_max_concurrency();
        assert!((1..=DEFAULT_CONCURRENCY_CEILING).contains(&width));
    }
}
