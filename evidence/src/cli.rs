//! CLI command implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::index::{build_index, write_index};
use crate::query::{
    QueryError, list_artifacts, list_runs, load_index, show_artifact, show_index_meta,
};
use crate::schemas::DEFAULT_EVIDENCE_DIR;

/// A read-only question about an existing index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    ListRuns,
    ListArtifacts { run_id: String },
    ShowArtifact { run_id: String, artifact_type: String },
    ShowIndexMeta,
}

/// Build the index over `roots` (default `.orchestrator_logs`) and write it to `out`.
///
/// Relative paths are resolved against `repo_root`. Prints nothing on success.
pub fn index_command(repo_root: &Path, roots: &[PathBuf], out: &Path) -> Result<()> {
    let roots: Vec<PathBuf> = if roots.is_empty() {
        vec![repo_root.join(DEFAULT_EVIDENCE_DIR)]
    } else {
        roots.iter().map(|root| repo_root.join(root)).collect()
    };
    let out_path = repo_root.join(out);
    debug!(roots = roots.len(), out = %out_path.display(), "building evidence index");

    let index = build_index(&roots, repo_root).context("build evidence index")?;
    write_index(&index, &out_path)
        .with_context(|| format!("write evidence index {}", out_path.display()))?;
    info!(runs = index.runs.len(), "evidence index written");
    Ok(())
}

/// Answer `query` against the index at `index_path` and return the lines to print.
pub fn query_command(
    repo_root: &Path,
    index_path: &Path,
    query: &Query,
) -> Result<Vec<String>, QueryError> {
    let index = load_index(&repo_root.join(index_path))?;
    match query {
        Query::ListRuns => Ok(list_runs(&index)),
        Query::ListArtifacts { run_id } => list_artifacts(&index, run_id),
        Query::ShowArtifact {
            run_id,
            artifact_type,
        } => show_artifact(&index, run_id, artifact_type).map(|path| vec![path]),
        Query::ShowIndexMeta => Ok(show_index_meta(&index)),
    }
}
