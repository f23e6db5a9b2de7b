//! Orchestrator configuration.
//!
//! Settings come from four layers, highest precedence first: CLI flags, the
//! process environment, an optional `orchestrator.toml`, built-in defaults.
//! The environment is read through an injectable lookup so tests never touch
//! the real process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::io::process::DEFAULT_OUTPUT_LIMIT_BYTES;
use crate::io::publish::CiRemote;

/// Config file looked up in the orchestrator root when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "orchestrator.toml";
/// Workspace registry looked up in the orchestrator root unless `ORCH_WORKSPACE_REGISTRY` is set.
pub const DEFAULT_REGISTRY_FILE: &str = "workspaces.yml";

pub const ENV_TASKPACK_PATH: &str = "TASKPACK_PATH";
pub const ENV_ENABLE_PLUGINS: &str = "ORCH_ENABLE_PLUGINS";
pub const ENV_PLUGINS_STRICT: &str = "ORCH_PLUGINS_STRICT";
pub const ENV_WORKSPACE: &str = "ORCH_WORKSPACE";
pub const ENV_WORKSPACE_REGISTRY: &str = "ORCH_WORKSPACE_REGISTRY";
pub const ENV_MAX_ATTEMPTS: &str = "MAX_ATTEMPTS";
pub const ENV_BRANCH_PREFIX: &str = "BRANCH_PREFIX";
pub const ENV_BASE_BRANCH: &str = "BASE_BRANCH";
pub const ENV_BRANCH_NAME: &str = "ORCH_BRANCH_NAME";
pub const ENV_RUN_AGENT: &str = "RUN_CODEX_SMOKE";
pub const ENV_COLLECT_REVIEW: &str = "ORCH_COLLECT_REVIEW";
pub const ENV_WRITE_EVIDENCE_INDEX: &str = "ORCH_WRITE_EVIDENCE_INDEX";

/// Environment lookup used while resolving settings.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read from the real process environment.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// `1 true yes y on`, case-insensitive and trimmed.
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "y" | "on")
    )
}

/// File-backed configuration (`orchestrator.toml`).
///
/// Missing fields default to the values the orchestrator uses without a file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Attempts per phase before the run fails.
    pub max_attempts: u32,
    /// Prefix for generated branch names (`<prefix>/<run id>`).
    pub branch_prefix: String,
    /// Fixed delay between failed attempts of a phase.
    pub retry_delay_secs: u64,
    /// Agent program and arguments. The phase prompt is written to its stdin.
    pub agent_command: Vec<String>,
    /// Kill the agent after this many seconds. No limit when unset.
    pub agent_timeout_secs: Option<u64>,
    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub agent_output_limit_bytes: usize,
    /// Advisory review program; `--mode advisory --report-path <path>` is appended.
    pub review_command: Vec<String>,
    /// Remote that run branches are pushed to.
    pub remote: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            branch_prefix: "codex".to_string(),
            retry_delay_secs: 2,
            agent_command: vec!["codex".to_string(), "exec".to_string(), "-".to_string()],
            agent_timeout_secs: None,
            agent_output_limit_bytes: DEFAULT_OUTPUT_LIMIT_BYTES,
            review_command: Vec::new(),
            remote: "origin".to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be > 0"));
        }
        if self.agent_command.is_empty() || self.agent_command[0].trim().is_empty() {
            return Err(anyhow!("agent_command must be a non-empty array"));
        }
        if self.agent_timeout_secs == Some(0) {
            return Err(anyhow!("agent_timeout_secs must be > 0 when set"));
        }
        if self.agent_output_limit_bytes == 0 {
            return Err(anyhow!("agent_output_limit_bytes must be > 0"));
        }
        if self.remote.trim().is_empty() {
            return Err(anyhow!("remote must be non-empty"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    pub enable_plugins: bool,
    pub plugins_strict: bool,
    pub workspace: Option<String>,
    pub config: Option<PathBuf>,
}

/// Agent invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub command: Vec<String>,
    pub timeout: Option<Duration>,
    pub output_limit_bytes: usize,
}

/// Fully resolved settings for one orchestrator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Repository the orchestrator runs from; target of the `playbook`/`self` aliases.
    pub orchestrator_root: PathBuf,
    pub taskpack_path: PathBuf,
    /// Workspace from CLI or env; `task.yml` is consulted later as the last fallback.
    pub workspace: Option<String>,
    pub registry_path: PathBuf,
    pub enable_plugins: bool,
    pub plugins_strict: bool,
    pub max_attempts: u32,
    pub branch_prefix: String,
    pub base_branch: Option<String>,
    pub branch_name: Option<String>,
    /// Invoke the agent for each phase. Off means a dry run.
    pub run_agent: bool,
    pub collect_review: bool,
    pub write_evidence_index: bool,
    pub retry_delay: Duration,
    pub agent: AgentSettings,
    pub review_command: Vec<String>,
    pub remote: String,
    pub ci_remote: Option<CiRemote>,
}

impl Settings {
    /// Merge CLI, environment, config file and defaults.
    pub fn resolve(orchestrator_root: &Path, cli: &CliOverrides, env: EnvLookup<'_>) -> Result<Self> {
        let config_path = match &cli.config {
            Some(path) => {
                let path = orchestrator_root.join(path);
                if !path.exists() {
                    bail!("config file does not exist: {}", path.display());
                }
                path
            }
            None => orchestrator_root.join(DEFAULT_CONFIG_FILE),
        };
        let file = load_config(&config_path)?;

        let non_empty = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        let taskpack = non_empty(ENV_TASKPACK_PATH)
            .ok_or_else(|| anyhow!("Missing required env var: {ENV_TASKPACK_PATH}"))?;
        let taskpack_path = orchestrator_root.join(taskpack);
        if !taskpack_path.exists() {
            bail!("TASKPACK_PATH does not exist: {}", taskpack_path.display());
        }

        let max_attempts = match non_empty(ENV_MAX_ATTEMPTS) {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| anyhow!("{ENV_MAX_ATTEMPTS} must be a positive integer, got '{raw}'"))?,
            None => file.max_attempts,
        };

        let registry_path = non_empty(ENV_WORKSPACE_REGISTRY)
            .map(|p| orchestrator_root.join(p))
            .unwrap_or_else(|| orchestrator_root.join(DEFAULT_REGISTRY_FILE));

        let settings = Self {
            orchestrator_root: orchestrator_root.to_path_buf(),
            taskpack_path,
            workspace: cli
                .workspace
                .clone()
                .filter(|w| !w.trim().is_empty())
                .or_else(|| non_empty(ENV_WORKSPACE)),
            registry_path,
            enable_plugins: cli.enable_plugins || is_truthy(env(ENV_ENABLE_PLUGINS).as_deref()),
            plugins_strict: cli.plugins_strict || is_truthy(env(ENV_PLUGINS_STRICT).as_deref()),
            max_attempts,
            branch_prefix: non_empty(ENV_BRANCH_PREFIX).unwrap_or(file.branch_prefix),
            base_branch: non_empty(ENV_BASE_BRANCH),
            branch_name: non_empty(ENV_BRANCH_NAME),
            run_agent: env(ENV_RUN_AGENT)
                .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            collect_review: is_truthy(env(ENV_COLLECT_REVIEW).as_deref()),
            write_evidence_index: is_truthy(env(ENV_WRITE_EVIDENCE_INDEX).as_deref()),
            retry_delay: Duration::from_secs(file.retry_delay_secs),
            agent: AgentSettings {
                command: file.agent_command,
                timeout: file.agent_timeout_secs.map(Duration::from_secs),
                output_limit_bytes: file.agent_output_limit_bytes,
            },
            review_command: file.review_command,
            remote: file.remote,
            ci_remote: CiRemote::from_env(env),
        };
        debug!(
            taskpack = %settings.taskpack_path.display(),
            run_agent = settings.run_agent,
            max_attempts = settings.max_attempts,
            "settings resolved"
        );
        Ok(settings)
    }
}
