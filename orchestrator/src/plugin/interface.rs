//! Solution plugin protocol types.
//!
//! Everything here is a plain value object handed to or returned from a
//! [`SolutionPlugin`] call. Fresh values are built per call.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::io::taskpack::{Constraints, TaskPack};

/// What a plugin needs from its environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PluginCapabilities {
    pub requires_network: bool,
    pub requires_cloud_mutations: bool,
    pub produces_domain_result: bool,
}

impl Default for PluginCapabilities {
    fn default() -> Self {
        Self {
            requires_network: false,
            requires_cloud_mutations: false,
            produces_domain_result: true,
        }
    }
}

/// Everything a plugin may touch during one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub run_id: String,
    pub taskpack_path: PathBuf,
    /// Scratch directory the plugin may use freely.
    pub workspace_dir: PathBuf,
    pub constraints: Constraints,
    /// Where artifacts and `plugin_result.json` are written.
    pub artifact_dir: PathBuf,
    log_path: PathBuf,
}

impl ExecutionContext {
    pub fn new(
        run_id: impl Into<String>,
        taskpack_path: impl Into<PathBuf>,
        workspace_dir: impl Into<PathBuf>,
        constraints: Constraints,
        artifact_dir: impl Into<PathBuf>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            taskpack_path: taskpack_path.into(),
            workspace_dir: workspace_dir.into(),
            constraints,
            artifact_dir: artifact_dir.into(),
            log_path: log_path.into(),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Append a line to the plugin log. Logging failures never fail the plugin.
    pub fn log(&self, message: &str) {
        info!(target: "plugin", run_id = %self.run_id, "{message}");
        let appended = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut file| writeln!(file, "{message}"));
        if let Err(err) = appended {
            warn!(path = %self.log_path.display(), err = %err, "plugin log write failed");
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Self::default()
        }
    }

    pub fn failed(errors: Vec<String>) -> Self {
        Self {
            ok: false,
            errors,
            warnings: Vec::new(),
        }
    }
}

/// Steps are opaque to the runner; only their count is recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub steps: Vec<Map<String, Value>>,
    pub expected_artifacts: Vec<String>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
    pub artifacts: Vec<PathBuf>,
    pub metadata: Map<String, Value>,
}

/// A solution plugin. Calls happen in the order
/// `capabilities → validate → plan → run → report`.
pub trait SolutionPlugin {
    fn id(&self) -> &str;
    fn version(&self) -> &str;
    fn capabilities(&self) -> PluginCapabilities;
    fn validate(&self, taskpack: &TaskPack, ctx: &ExecutionContext) -> Result<ValidationReport>;
    fn plan(&self, taskpack: &TaskPack, ctx: &ExecutionContext) -> Result<Plan>;
    fn run(&self, plan: &Plan, ctx: &ExecutionContext) -> Result<RawOutput>;
    /// Write report files and return their paths.
    fn report(&self, raw: &RawOutput, ctx: &ExecutionContext) -> Result<Vec<PathBuf>>;
}
