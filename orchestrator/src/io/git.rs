//! Git adapter for orchestrator runs.
//!
//! Every git side effect of a run (branching, commits, diffs for scope checks,
//! pushes) goes through this small, explicit wrapper around `git` subprocess calls.

use std::path::PathBuf;
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD (refuse to run)"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Resolve a revision to its full SHA.
    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--verify", rev])?;
        Ok(out.trim().to_string())
    }

    /// Check whether a revision (branch, tag, sha) resolves.
    pub fn rev_exists(&self, rev: &str) -> Result<bool> {
        let status = self.run(&["rev-parse", "--verify", "--quiet", rev])?.status;
        Ok(status.success())
    }

    /// Check out `branch`, creating it at HEAD if it does not exist yet.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_or_create(&self, branch: &str) -> Result<()> {
        if self.rev_exists(branch)? {
            debug!(branch, "checking out existing branch");
            self.run_checked(&["checkout", branch])?;
        } else {
            debug!(branch, "creating and checking out new branch");
            self.run_checked(&["checkout", "-b", branch])?;
        }
        Ok(())
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Stage everything and commit it with `message`.
    ///
    /// Returns `Ok(false)` without committing when nothing changed.
    #[instrument(skip_all)]
    pub fn commit_all(&self, message: &str) -> Result<bool> {
        self.add_all()?;
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!(message, "committing staged changes");
        self.run_checked(&["commit", "-m", message])?;
        Ok(true)
    }

    /// Files changed on the current branch since it diverged from `base`.
    pub fn diff_name_only(&self, base: &str) -> Result<Vec<String>> {
        let range = format!("{base}...HEAD");
        let out = self.run_capture(&["diff", "--name-only", &range])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Push `HEAD` to `remote`, setting upstream.
    #[instrument(skip_all, fields(remote))]
    pub fn push_head(&self, remote: &str) -> Result<()> {
        info!(remote, "pushing HEAD");
        self.run_checked(&["push", "-u", remote, "HEAD"])?;
        Ok(())
    }

    pub fn set_remote_url(&self, remote: &str, url: &str) -> Result<()> {
        self.run_checked(&["remote", "set-url", remote, url])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn commit_all_skips_when_clean() {
        let repo = TestRepo::new();
        let git = Git::new(repo.path());

        assert!(!git.commit_all("nothing").expect("commit"));

        fs::write(repo.path().join("new.txt"), "x").expect("write");
        assert!(git.commit_all("add new").expect("commit"));
        assert!(!git.has_staged_changes().expect("staged"));
    }

    #[test]
    fn checkout_or_create_reuses_existing_branch() {
        let repo = TestRepo::new();
        let git = Git::new(repo.path());

        git.checkout_or_create("codex/t-1").expect("create");
        assert_eq!(git.current_branch().expect("branch"), "codex/t-1");

        git.checkout_or_create("main").expect("back to main");
        git.checkout_or_create("codex/t-1").expect("reuse");
        assert_eq!(git.current_branch().expect("branch"), "codex/t-1");
    }

    #[test]
    fn diff_name_only_lists_branch_changes() {
        let repo = TestRepo::new();
        let git = Git::new(repo.path());
        let base = git.rev_parse("HEAD").expect("base");

        fs::create_dir_all(repo.path().join("src")).expect("mkdir");
        fs::write(repo.path().join("src/a.txt"), "a").expect("write");
        fs::write(repo.path().join("b.txt"), "b").expect("write");
        git.commit_all("change").expect("commit");

        let changed = git.diff_name_only(&base).expect("diff");
        assert_eq!(changed, vec!["b.txt", "src/a.txt"]);
    }

    #[test]
    fn push_head_updates_origin() {
        let repo = TestRepo::with_origin();
        let git = Git::new(repo.path());

        git.checkout_or_create("codex/push").expect("branch");
        fs::write(repo.path().join("p.txt"), "p").expect("write");
        git.commit_all("push me").expect("commit");
        git.push_head("origin").expect("push");

        let head = git.rev_parse("HEAD").expect("head");
        assert_eq!(repo.origin_rev("codex/push"), head);
    }
}
