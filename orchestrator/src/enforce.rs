//! Scope and contract checks run after acceptance and before publishing.
//!
//! Every check reports all of its violations at once so a single rerun can
//! fix them.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::path::scope_violations;
use crate::io::git::Git;
use crate::io::taskpack::TaskPack;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("Missing required docs:\n{}", bullets(.0.iter().map(|p| p.display().to_string())))]
    MissingDocs(Vec<PathBuf>),
    #[error(
        "Changes outside scope.allowed_paths (diff {base}...HEAD):\n{}",
        bullets(.paths.iter().cloned())
    )]
    ScopeViolation { base: String, paths: Vec<String> },
    #[error(
        "Task packs for managed workspaces must declare non-empty {}",
        .missing.join(" and ")
    )]
    ManagedContract { missing: Vec<&'static str> },
    #[error(transparent)]
    Git(#[from] anyhow::Error),
}

fn bullets(items: impl Iterator<Item = String>) -> String {
    items
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every `docs.required` path must exist under `workspace_root`.
pub fn ensure_required_docs(taskpack: &TaskPack, workspace_root: &Path) -> Result<(), ContractError> {
    let missing: Vec<PathBuf> = taskpack
        .docs_required
        .iter()
        .map(|doc| workspace_root.join(doc))
        .filter(|path| !path.exists())
        .collect();
    if missing.is_empty() {
        debug!(count = taskpack.docs_required.len(), "required docs present");
        return Ok(());
    }
    Err(ContractError::MissingDocs(missing))
}

/// Every path changed since `base_ref` must sit within an allowed prefix.
///
/// An empty allow-list skips the check; managed workspaces are rejected
/// earlier by [`ensure_managed_contract`].
#[instrument(skip_all, fields(base_ref = %base_ref))]
pub fn enforce_scope_allowed_paths(
    taskpack: &TaskPack,
    workspace_root: &Path,
    base_ref: &str,
) -> Result<(), ContractError> {
    if taskpack.allowed_paths.is_empty() {
        debug!("no scope.allowed_paths declared; scope check skipped");
        return Ok(());
    }
    let changed = Git::new(workspace_root).diff_name_only(base_ref)?;
    let violations = scope_violations(&changed, &taskpack.allowed_paths);
    if violations.is_empty() {
        debug!(changed = changed.len(), "all changes within scope");
        return Ok(());
    }
    Err(ContractError::ScopeViolation {
        base: base_ref.to_string(),
        paths: violations.into_iter().map(str::to_string).collect(),
    })
}

/// Managed (foreign) workspaces need both a doc list and a scope list.
pub fn ensure_managed_contract(taskpack: &TaskPack, managed: bool) -> Result<(), ContractError> {
    if !managed {
        return Ok(());
    }
    let mut missing = Vec::new();
    if taskpack.docs_required.is_empty() {
        missing.push("docs.required");
    }
    if taskpack.allowed_paths.is_empty() {
        missing.push("scope.allowed_paths");
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ContractError::ManagedContract { missing })
    }
}

/// Run every contract check for a finished run.
pub fn enforce_contract(
    taskpack: &TaskPack,
    workspace_root: &Path,
    base_ref: &str,
    managed: bool,
) -> Result<(), ContractError> {
    ensure_managed_contract(taskpack, managed)?;
    ensure_required_docs(taskpack, workspace_root)?;
    enforce_scope_allowed_paths(taskpack, workspace_root, base_ref)?;
    info!("scope and contract checks passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::{TaskPackBuilder, TestRepo, write_taskpack};

    fn taskpack(dir: &Path, extra: &str) -> TaskPack {
        let task = format!(
            "id: TASK-3\ntitle: Three\nconstraints:\n  allow_network: false\n  allow_cloud_mutations: false\n{extra}"
        );
        write_taskpack(dir, &TaskPackBuilder::default().task_yml(&task));
        TaskPack::load(dir).expect("load")
    }

    /// Ensures the error lists every missing doc, then passes once they exist.
    #[test]
    fn required_docs_lists_every_missing_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pack = taskpack(
            &temp.path().join("tp"),
            "docs:\n  required: [docs/A.md, docs/B.md, README.md]\n",
        );
        let root = temp.path().join("ws");
        fs::create_dir_all(root.join("docs")).expect("mkdir");
        fs::write(root.join("README.md"), "r").expect("write");

        let err = ensure_required_docs(&pack, &root).unwrap_err();
        match &err {
            ContractError::MissingDocs(paths) => {
                assert_eq!(paths, &vec![root.join("docs/A.md"), root.join("docs/B.md")]);
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains(&root.join("docs/A.md").display().to_string()));
        assert!(message.contains(&root.join("docs/B.md").display().to_string()));

        fs::write(root.join("docs/A.md"), "a").expect("write");
        fs::write(root.join("docs/B.md"), "b").expect("write");
        ensure_required_docs(&pack, &root).expect("docs present");
    }

    #[test]
    fn scope_passes_for_allowed_changes() {
        let repo = TestRepo::new();
        let git = Git::new(repo.path());
        let base = git.rev_parse("HEAD").expect("base");
        let pack = taskpack(
            &repo.path().join("tp"),
            "scope:\n  allowed_paths: [\"src/\", tp]\n",
        );
        fs::create_dir_all(repo.path().join("src")).expect("mkdir");
        fs::write(repo.path().join("src/ok.txt"), "ok").expect("write");
        git.commit_all("in scope").expect("commit");

        enforce_scope_allowed_paths(&pack, repo.path(), &base).expect("in scope");
    }

    /// Verifies segment matching: `src/` never admits `src-legacy/`.
    #[test]
    fn scope_violation_lists_exactly_offending_paths() {
        let repo = TestRepo::new();
        let git = Git::new(repo.path());
        let base = git.rev_parse("HEAD").expect("base");
        let pack = taskpack(
            &repo.path().join("tp"),
            "scope:\n  allowed_paths: [\"src/\", tp]\n",
        );
        for path in ["src/ok.txt", "secrets/nope.txt", "src-legacy/file"] {
            let full = repo.path().join(path);
            fs::create_dir_all(full.parent().expect("parent")).expect("mkdir");
            fs::write(full, "x").expect("write");
        }
        git.commit_all("mixed").expect("commit");

        let err = enforce_scope_allowed_paths(&pack, repo.path(), &base).unwrap_err();

        match err {
            ContractError::ScopeViolation { paths, .. } => {
                assert_eq!(paths, vec!["secrets/nope.txt", "src-legacy/file"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_allow_list_skips_scope_check() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pack = taskpack(&temp.path().join("tp"), "");

        // Not a git repo: the check must not even run git.
        enforce_scope_allowed_paths(&pack, temp.path(), "main").expect("skipped");
    }

    #[test]
    fn managed_workspace_needs_docs_and_scope() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pack = taskpack(&temp.path().join("tp"), "");

        ensure_managed_contract(&pack, false).expect("self repo");
        let err = ensure_managed_contract(&pack, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Task packs for managed workspaces must declare non-empty docs.required and scope.allowed_paths"
        );
    }
}
