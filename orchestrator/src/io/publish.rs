//! Publishing a run: CI push credentials and pull requests via `gh`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};

use crate::io::config::EnvLookup;
use crate::io::git::Git;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command};
use crate::io::taskpack::TaskPack;

/// Token-authenticated HTTPS remote used when running under GitHub Actions.
#[derive(Clone, PartialEq, Eq)]
pub struct CiRemote {
    /// `owner/name`.
    pub repository: String,
    token: String,
}

impl std::fmt::Debug for CiRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiRemote")
            .field("repository", &self.repository)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl CiRemote {
    /// Present only when `GITHUB_ACTIONS=true` with `GITHUB_REPOSITORY` and a
    /// `GITHUB_TOKEN` (or `GH_TOKEN`).
    pub fn from_env(env: EnvLookup<'_>) -> Option<Self> {
        let on_actions = env("GITHUB_ACTIONS").is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        if !on_actions {
            return None;
        }
        let repository = env("GITHUB_REPOSITORY").filter(|v| !v.trim().is_empty())?;
        let token = env("GITHUB_TOKEN")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| env("GH_TOKEN").filter(|v| !v.trim().is_empty()))?;
        Some(Self { repository, token })
    }

    pub fn url(&self) -> String {
        format!(
            "https://x-access-token:{}@github.com/{}.git",
            self.token, self.repository
        )
    }
}

/// Where run branches are pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushTarget {
    pub remote: String,
    pub ci: Option<CiRemote>,
}

impl PushTarget {
    /// Rewrite the remote to the token URL (under CI), then push `HEAD`.
    #[instrument(skip_all, fields(remote = %self.remote))]
    pub fn push(&self, git: &Git) -> Result<()> {
        if let Some(ci) = &self.ci {
            debug!(repository = %ci.repository, "using token remote for CI push");
            git.set_remote_url(&self.remote, &ci.url())?;
        }
        git.push_head(&self.remote)
    }
}

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRequest {
    pub workdir: PathBuf,
    pub base: String,
    pub head: String,
    pub title: String,
    pub body_path: PathBuf,
}

/// Pull request hosting backend.
pub trait PullRequests {
    /// True when an open PR already exists for `head`.
    fn exists_for_head(&self, workdir: &Path, head: &str) -> Result<bool>;
    /// Open a PR and return its URL (or the CLI's last output line).
    fn create(&self, request: &PullRequestRequest) -> Result<String>;
}

/// Backend that shells out to the GitHub CLI.
pub struct GhCli;

impl PullRequests for GhCli {
    fn exists_for_head(&self, workdir: &Path, head: &str) -> Result<bool> {
        let mut cmd = Command::new("gh");
        cmd.args(["pr", "list", "--head", head, "--json", "number", "-q", "length"])
            .current_dir(workdir);
        let output = run_command(cmd, None, None, DEFAULT_OUTPUT_LIMIT_BYTES)
            .context("run gh pr list")?;
        let count = output.stdout_text();
        Ok(output.success() && !matches!(count.trim(), "" | "0"))
    }

    #[instrument(skip_all, fields(head = %request.head, base = %request.base))]
    fn create(&self, request: &PullRequestRequest) -> Result<String> {
        let mut cmd = Command::new("gh");
        cmd.args(["pr", "create", "--base", &request.base, "--title", &request.title])
            .arg("--body-file")
            .arg(&request.body_path)
            .current_dir(&request.workdir);
        let output = run_command(cmd, None, None, DEFAULT_OUTPUT_LIMIT_BYTES)
            .context("run gh pr create")?;
        if !output.success() {
            bail!(
                "gh pr create failed with status {:?}: {}",
                output.code(),
                output.combined_text("gh").trim()
            );
        }
        let stdout = output.stdout_text();
        Ok(stdout.lines().last().unwrap_or_default().trim().to_string())
    }
}

/// What happened when publishing the PR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrOutcome {
    Created(String),
    AlreadyExists,
}

/// PR body: the task pack's `pr_body.md` when the `pr_author` phase wrote one,
/// otherwise a generated default.
pub fn pr_body(taskpack: &TaskPack, branch_name: &str, base_branch: &str) -> Result<String> {
    let path = taskpack.pr_body_path();
    if path.is_file() {
        return fs::read_to_string(&path).with_context(|| format!("read {}", path.display()));
    }
    Ok(default_pr_body(taskpack, branch_name, base_branch))
}

/// Generated PR body used when no `pr_body.md` was authored.
pub fn default_pr_body(taskpack: &TaskPack, branch_name: &str, base_branch: &str) -> String {
    let acceptance: Vec<String> = [
        &taskpack.acceptance.format,
        &taskpack.acceptance.lint,
        &taskpack.acceptance.tests,
    ]
    .into_iter()
    .flat_map(|group| group.commands.iter())
    .map(|cmd| format!("- `{cmd}`"))
    .collect();
    let acceptance = if acceptance.is_empty() {
        "- (no acceptance commands declared)".to_string()
    } else {
        acceptance.join("\n")
    };
    let plugin = taskpack.plugin.as_deref().unwrap_or("(none)");

    format!(
        "## Summary\n\
         {title}\n\n\
         Automated changes for task pack `{id}` on branch `{branch}` (base `{base}`).\n\n\
         ## Evidence\n\
         Acceptance commands run by the orchestrator:\n\
         {acceptance}\n\n\
         Plugin: `{plugin}`\n\n\
         ## Risk / rollback\n\
         - See `risk.md` in `{path}`.\n\
         - Rollback: revert the commits on `{branch}`.\n",
        title = taskpack.title,
        id = taskpack.id,
        branch = branch_name,
        base = base_branch,
        path = taskpack.path.display(),
    )
}

/// Write the PR body into the run's log dir and open the PR unless one exists.
#[instrument(skip_all, fields(head = branch_name))]
pub fn open_pull_request<P: PullRequests>(
    prs: &P,
    workdir: &Path,
    taskpack: &TaskPack,
    log_dir: &Path,
    branch_name: &str,
    base_branch: &str,
) -> Result<PrOutcome> {
    if prs.exists_for_head(workdir, branch_name)? {
        info!("PR already exists for this branch; skipping creation");
        return Ok(PrOutcome::AlreadyExists);
    }
    let body = pr_body(taskpack, branch_name, base_branch)?;
    let body_path = log_dir.join("pr_body.md");
    fs::write(&body_path, body).with_context(|| format!("write {}", body_path.display()))?;

    let url = prs.create(&PullRequestRequest {
        workdir: workdir.to_path_buf(),
        base: base_branch.to_string(),
        head: branch_name.to_string(),
        title: format!("{}: {}", taskpack.id, taskpack.title),
        body_path,
    })?;
    Ok(PrOutcome::Created(url))
}
