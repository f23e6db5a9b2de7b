//! Executor abstraction for agent invocation.
//!
//! The [`AgentExecutor`] trait decouples the phase loop from the actual agent
//! backend (by default `codex exec -`). Tests use scripted executors that
//! return predetermined exit codes without spawning processes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::AgentSettings;
use crate::io::process::run_command;

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Working directory for the agent process (the workspace root).
    pub workdir: PathBuf,
    /// Prompt text fed to the agent on stdin.
    pub prompt: String,
    /// Where the combined agent output is written.
    pub log_path: PathBuf,
}

/// Result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRun {
    /// Exit code; `None` when the process was killed (including on timeout).
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl AgentRun {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out
    }
}

/// Abstraction over agent execution backends.
pub trait AgentExecutor {
    /// Run the agent. Implementations must write the combined output to
    /// `request.log_path`. A non-zero exit is reported, not returned as an error.
    fn invoke(&self, request: &AgentRequest) -> Result<AgentRun>;
}

/// Executor that spawns the configured agent command (default `codex exec -`).
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl CommandExecutor {
    pub fn from_settings(settings: &AgentSettings) -> Result<Self> {
        let (program, args) = settings
            .command
            .split_first()
            .ok_or_else(|| anyhow!("agent_command must not be empty"))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: settings.timeout,
            output_limit_bytes: settings.output_limit_bytes,
        })
    }
}

impl AgentExecutor for CommandExecutor {
    #[instrument(skip_all, fields(program = %self.program, timeout_secs = self.timeout.map(|t| t.as_secs())))]
    fn invoke(&self, request: &AgentRequest) -> Result<AgentRun> {
        info!(workdir = %request.workdir.display(), "starting agent");
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).current_dir(&request.workdir);

        let output = run_command(
            cmd,
            Some(request.prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run agent {}", self.program))?;

        write_agent_log(&request.log_path, &output.combined_text("agent"))?;

        if output.timed_out {
            warn!(timeout_secs = ?self.timeout.map(|t| t.as_secs()), "agent timed out");
        } else if !output.success() {
            warn!(exit_code = ?output.code(), "agent exited non-zero");
        } else {
            debug!("agent completed successfully");
        }
        Ok(AgentRun {
            exit_code: output.code(),
            timed_out: output.timed_out,
        })
    }
}

/// Write an agent log, creating its directory.
pub fn write_agent_log(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create agent log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write agent log {}", path.display()))
}
