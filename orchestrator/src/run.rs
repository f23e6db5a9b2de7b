//! Per-run identity and paths, threaded explicitly through every stage.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use evidence::schemas::MANIFEST_FILENAME;
use tracing::{debug, instrument};

use crate::core::naming::{default_branch_name, run_id};
use crate::io::config::Settings;
use crate::io::git::Git;
use crate::io::taskpack::TaskPack;
use crate::io::workspace::{
    WorkspaceConfig, ensure_evidence_isolated, evidence_paths, is_self_workspace,
    resolve_workspace, select_workspace_spec,
};

/// Everything that identifies one run and where it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: String,
    pub branch_name: String,
    pub base_branch: String,
    pub evidence_root: PathBuf,
    /// `evidence_root/run_id`.
    pub log_dir: PathBuf,
    pub workspace: WorkspaceConfig,
    pub orchestrator_root: PathBuf,
}

impl RunContext {
    /// Resolve the workspace, check evidence isolation, derive names and create
    /// the log dir.
    ///
    /// Nothing is written before the isolation check passes.
    #[instrument(skip_all, fields(task = %taskpack.id))]
    pub fn prepare(settings: &Settings, taskpack: &TaskPack, unix_secs: u64) -> Result<Self> {
        let spec = select_workspace_spec(
            settings.workspace.as_deref(),
            None,
            taskpack.workspace.as_deref(),
        );
        let workspace = resolve_workspace(
            spec.as_deref(),
            &settings.registry_path,
            &settings.orchestrator_root,
        )?;

        let run_id = run_id(&taskpack.id, unix_secs);
        let (evidence_root, log_dir) = evidence_paths(&workspace, &run_id)?;
        ensure_evidence_isolated(&workspace, &evidence_root, &settings.orchestrator_root)?;

        let base_branch = match &settings.base_branch {
            Some(base) => base.clone(),
            None => Git::new(&workspace.root).current_branch()?,
        };
        let branch_name = settings
            .branch_name
            .clone()
            .unwrap_or_else(|| default_branch_name(&settings.branch_prefix, &run_id));

        fs::create_dir_all(&log_dir)
            .with_context(|| format!("create log dir {}", log_dir.display()))?;
        debug!(run_id, branch = %branch_name, log_dir = %log_dir.display(), "run prepared");

        Ok(Self {
            run_id,
            branch_name,
            base_branch,
            evidence_root,
            log_dir,
            workspace,
            orchestrator_root: settings.orchestrator_root.clone(),
        })
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.log_dir.join(MANIFEST_FILENAME)
    }

    /// Directory that manifest paths are recorded relative to: the parent of
    /// the evidence root.
    pub fn evidence_base(&self) -> &Path {
        self.evidence_root.parent().unwrap_or(&self.evidence_root)
    }

    /// `path` relative to [`Self::evidence_base`], `/`-separated; unchanged when outside it.
    pub fn relative_to_base(&self, path: &Path) -> String {
        path.strip_prefix(self.evidence_base())
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// True when the workspace is the orchestrator's own repository.
    pub fn is_self_workspace(&self) -> bool {
        is_self_workspace(&self.workspace, &self.orchestrator_root)
    }

    pub fn plugin_artifact_dir(&self, task_id: &str) -> PathBuf {
        self.log_dir.join("plugin").join(task_id)
    }

    pub fn plugin_workspace_dir(&self) -> PathBuf {
        self.log_dir.join("plugin_workspace")
    }

    pub fn plugin_log_path(&self, task_id: &str) -> PathBuf {
        self.log_dir
            .join(format!("plugin_{}.log", task_id.to_lowercase()))
    }
}
