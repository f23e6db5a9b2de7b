//! Evidence index builder.
//!
//! The index is pure derived state: it is recomputed from the filesystem on every build and
//! two builds over an unchanged tree differ only in `generated_at`. A run directory is any
//! directory under a scanned root (the root included) that directly contains
//! [`MANIFEST_FILENAME`]; nothing else is used for run discovery.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::schemas::{INDEX_SCHEMA_VERSION, MANIFEST_FILENAME, REVIEW_REPORT_FILENAME};

/// Artifact type for the run manifest.
pub const ARTIFACT_MANIFEST: &str = "manifest";
/// Artifact type for the review report.
pub const ARTIFACT_REVIEW_REPORT: &str = "review_report";

/// Serialized `evidence_index.json`.
///
/// Fields are declared in lexicographic order so the serialized keys are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceIndex {
    /// RFC3339 UTC timestamp of the build (second precision).
    pub generated_at: String,
    /// Scanned roots, repo-relative, deduplicated in input order.
    pub roots_scanned: Vec<String>,
    /// Discovered runs sorted by `(run_id, run_dir)`.
    pub runs: Vec<RunEntry>,
    pub schema_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    /// Artifacts sorted by `(type, path)`.
    pub artifacts: Vec<ArtifactEntry>,
    pub manifest_path: Option<String>,
    pub run_dir: String,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub schema_version: Option<i64>,
    #[serde(rename = "type")]
    pub artifact_type: String,
}

/// Failures while building or writing the index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("path is outside repo root: {}", .0.display())]
    OutsideRepoRoot(PathBuf),
    #[error("walk {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize index: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IndexError {
    /// Short, stable name of the failure class (recorded in manifests).
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::OutsideRepoRoot(_) => "OutsideRepoRoot",
            IndexError::Walk { .. } => "Walk",
            IndexError::Io { .. } => "Io",
            IndexError::Serialize(_) => "Serialize",
        }
    }
}

/// RFC3339 UTC timestamp with second precision and a `Z` suffix.
pub fn rfc3339_utc_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Build the index over `roots`, expressing every path relative to `repo_root`.
#[instrument(skip_all, fields(roots = roots.len(), repo_root = %repo_root.display()))]
pub fn build_index(roots: &[PathBuf], repo_root: &Path) -> Result<EvidenceIndex, IndexError> {
    let repo_root = resolve(repo_root);

    let mut roots_scanned = Vec::new();
    for root in roots {
        let rel = repo_relative(root, &repo_root)?;
        if !roots_scanned.contains(&rel) {
            roots_scanned.push(rel);
        }
    }

    let mut runs = Vec::new();
    let mut seen_run_dirs = BTreeSet::new();
    for root in roots {
        for run_dir in discover_run_dirs(root)? {
            let run_rel = repo_relative(&run_dir, &repo_root)?;
            if !seen_run_dirs.insert(run_rel.clone()) {
                continue;
            }

            let manifest_path = run_dir.join(MANIFEST_FILENAME);
            let manifest_rel = if manifest_path.is_file() {
                Some(repo_relative(&manifest_path, &repo_root)?)
            } else {
                None
            };
            runs.push(RunEntry {
                artifacts: collect_artifacts(&run_dir, &repo_root)?,
                manifest_path: manifest_rel,
                run_id: run_id_for(&run_dir, &run_rel),
                run_dir: run_rel,
            });
        }
    }

    runs.sort_by(|a, b| (&a.run_id, &a.run_dir).cmp(&(&b.run_id, &b.run_dir)));
    debug!(runs = runs.len(), "evidence index built");

    Ok(EvidenceIndex {
        generated_at: rfc3339_utc_now(),
        roots_scanned,
        runs,
        schema_version: INDEX_SCHEMA_VERSION,
    })
}

/// Serialize with 2-space indentation and a trailing newline.
pub fn serialize_index(index: &EvidenceIndex) -> Result<String, IndexError> {
    let mut buf = serde_json::to_string_pretty(index)?;
    buf.push('\n');
    Ok(buf)
}

/// Write the index to `out_path`, creating parent directories.
pub fn write_index(index: &EvidenceIndex, out_path: &Path) -> Result<(), IndexError> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent).map_err(|source| IndexError::Io {
            action: "create",
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let payload = serialize_index(index)?;
    fs::write(out_path, payload).map_err(|source| IndexError::Io {
        action: "write",
        path: out_path.to_path_buf(),
        source,
    })
}

fn discover_run_dirs(root: &Path) -> Result<Vec<PathBuf>, IndexError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    // Keyed by resolved path so the same directory reached twice is listed once.
    let mut run_dirs: BTreeMap<String, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| IndexError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || entry.file_name() != MANIFEST_FILENAME {
            continue;
        }
        let Some(run_dir) = entry.path().parent() else {
            continue;
        };
        run_dirs.insert(to_posix(&resolve(run_dir)), run_dir.to_path_buf());
    }
    Ok(run_dirs.into_values().collect())
}

fn collect_artifacts(run_dir: &Path, repo_root: &Path) -> Result<Vec<ArtifactEntry>, IndexError> {
    let mut artifacts = Vec::new();

    let manifest_path = run_dir.join(MANIFEST_FILENAME);
    if manifest_path.is_file() {
        artifacts.push(ArtifactEntry {
            path: repo_relative(&manifest_path, repo_root)?,
            schema_version: None,
            artifact_type: ARTIFACT_MANIFEST.to_string(),
        });
    }

    let review_path = run_dir.join(REVIEW_REPORT_FILENAME);
    if review_path.is_file() {
        artifacts.push(ArtifactEntry {
            path: repo_relative(&review_path, repo_root)?,
            schema_version: extract_schema_version(&review_path),
            artifact_type: ARTIFACT_REVIEW_REPORT.to_string(),
        });
    }

    // Every other file (the index itself included) is ignored.
    artifacts.sort_by(|a, b| (&a.artifact_type, &a.path).cmp(&(&b.artifact_type, &b.path)));
    Ok(artifacts)
}

fn run_id_for(run_dir: &Path, run_rel: &str) -> String {
    load_json(&run_dir.join(MANIFEST_FILENAME))
        .as_ref()
        .and_then(|data| data.get("run_id"))
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| run_rel.to_string())
}

fn extract_schema_version(path: &Path) -> Option<i64> {
    load_json(path)?
        .as_object()?
        .get("schema_version")?
        .as_i64()
}

fn load_json(path: &Path) -> Option<Value> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn repo_relative(path: &Path, repo_root: &Path) -> Result<String, IndexError> {
    let resolved = resolve(path);
    let rel = resolved
        .strip_prefix(repo_root)
        .map_err(|_| IndexError::OutsideRepoRoot(path.to_path_buf()))?;
    let posix = to_posix(rel);
    if posix.is_empty() {
        return Ok(".".to_string());
    }
    Ok(posix)
}

/// Canonicalize when the path exists, otherwise make it absolute lexically.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

fn to_posix(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::RootDir => Some(String::new()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::INDEX_FILENAME;

    fn write_json(path: &Path, payload: &str) {
        fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
        fs::write(path, payload).expect("write json");
    }

    #[test]
    fn build_index_orders_runs_and_artifacts_deterministically() {
        let temp = tempfile::tempdir().expect("tempdir");
        let repo_root = temp.path();
        let logs_root = repo_root.join(".orchestrator_logs");

        let run_a = logs_root.join("run-a");
        let run_b = logs_root.join("run-b");
        write_json(&run_a.join(MANIFEST_FILENAME), r#"{"run_id": "b-run"}"#);
        write_json(&run_b.join(MANIFEST_FILENAME), r#"{"run_id": "a-run"}"#);
        fs::create_dir_all(logs_root.join("run-no-manifest")).expect("mkdir");
        write_json(
            &run_b.join(REVIEW_REPORT_FILENAME),
            r#"{"schema_version": 1, "violations": []}"#,
        );
        write_json(&run_b.join(INDEX_FILENAME), "{}");

        let index = build_index(&[logs_root.clone()], repo_root).expect("build");

        assert_eq!(index.schema_version, INDEX_SCHEMA_VERSION);
        assert_eq!(index.roots_scanned, vec![".orchestrator_logs"]);

        let ids: Vec<&str> = index.runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["a-run", "b-run"]);
        let dirs: Vec<&str> = index.runs.iter().map(|r| r.run_dir.as_str()).collect();
        assert_eq!(
            dirs,
            vec![".orchestrator_logs/run-b", ".orchestrator_logs/run-a"]
        );

        let run_b_entry = &index.runs[0];
        assert_eq!(
            run_b_entry.manifest_path.as_deref(),
            Some(".orchestrator_logs/run-b/manifest.json")
        );
        let types: Vec<&str> = run_b_entry
            .artifacts
            .iter()
            .map(|a| a.artifact_type.as_str())
            .collect();
        assert_eq!(types, vec![ARTIFACT_MANIFEST, ARTIFACT_REVIEW_REPORT]);
        let versions: Vec<Option<i64>> = run_b_entry
            .artifacts
            .iter()
            .map(|a| a.schema_version)
            .collect();
        assert_eq!(versions, vec![None, Some(1)]);
        assert!(
            index
                .runs
                .iter()
                .flat_map(|r| &r.artifacts)
                .all(|a| !a.path.contains(INDEX_FILENAME))
        );
    }

    #[test]
    fn unparsable_review_report_degrades_to_null_schema_version() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logs_root = temp.path().join(".orchestrator_logs");
        let run_dir = logs_root.join("run-invalid");
        write_json(&run_dir.join(MANIFEST_FILENAME), r#"{"run_id": "invalid-json"}"#);
        write_json(&run_dir.join(REVIEW_REPORT_FILENAME), "{");

        let index = build_index(&[logs_root], temp.path()).expect("build");

        assert_eq!(index.runs.len(), 1);
        let artifacts = &index.runs[0].artifacts;
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[1].artifact_type, ARTIFACT_REVIEW_REPORT);
        assert_eq!(artifacts[1].schema_version, None);
    }

    #[test]
    fn corrupt_manifest_falls_back_to_run_dir_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logs_root = temp.path().join("logs");
        write_json(&logs_root.join("nested/deep/run").join(MANIFEST_FILENAME), "not json");
        write_json(&logs_root.join("blank").join(MANIFEST_FILENAME), r#"{"run_id": "  "}"#);

        let index = build_index(&[logs_root], temp.path()).expect("build");

        let ids: Vec<&str> = index.runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec!["logs/blank", "logs/nested/deep/run"]);
    }

    #[test]
    fn root_with_manifest_is_itself_a_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logs_root = temp.path().join("logs");
        write_json(&logs_root.join(MANIFEST_FILENAME), "{}");

        let index = build_index(&[logs_root], temp.path()).expect("build");

        assert_eq!(index.runs.len(), 1);
        assert_eq!(index.runs[0].run_dir, "logs");
    }

    #[test]
    fn rebuild_is_identical_except_generated_at() {
        let temp = tempfile::tempdir().expect("tempdir");
        let logs_root = temp.path().join(".orchestrator_logs");
        write_json(&logs_root.join("r1").join(MANIFEST_FILENAME), r#"{"run_id": "r1"}"#);
        write_json(&logs_root.join("r2").join(MANIFEST_FILENAME), r#"{"run_id": "r2"}"#);

        let first = build_index(&[logs_root.clone()], temp.path()).expect("first");
        write_index(&first, &logs_root.join(INDEX_FILENAME)).expect("write");
        let mut second = build_index(&[logs_root.clone(), logs_root], temp.path()).expect("second");
        second.generated_at = first.generated_at.clone();

        assert_eq!(first, second);
    }

    #[test]
    fn root_outside_repo_is_rejected() {
        let repo = tempfile::tempdir().expect("repo");
        let other = tempfile::tempdir().expect("other");

        let err = build_index(&[other.path().to_path_buf()], repo.path()).unwrap_err();
        assert_eq!(err.kind(), "OutsideRepoRoot");
        assert!(err.to_string().contains("path is outside repo root"));
    }

    #[test]
    fn serialized_index_has_sorted_keys_and_trailing_newline() {
        let index = EvidenceIndex {
            generated_at: "2025-01-01T00:00:00Z".to_string(),
            roots_scanned: vec![".orchestrator_logs".to_string()],
            runs: Vec::new(),
            schema_version: 1,
        };
        let out = serialize_index(&index).expect("serialize");
        let expected = "{\n  \"generated_at\": \"2025-01-01T00:00:00Z\",\n  \"roots_scanned\": [\n    \".orchestrator_logs\"\n  ],\n  \"runs\": [],\n  \"schema_version\": 1\n}\n";
        assert_eq!(out, expected);
    }
}
