//! Read-only queries over a serialized evidence index.
//!
//! Queries read the index as loose JSON rather than [`crate::index::EvidenceIndex`] so that
//! indexes written by older or foreign producers still answer what they can. Each query
//! returns the lines to print; the CLI owns stdout.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

/// Lookup and load failures. The CLI maps every variant to exit code 2.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("index file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("invalid JSON in index file: {}", .0.display())]
    InvalidJson(PathBuf),
    #[error("invalid index schema: {0}")]
    InvalidSchema(&'static str),
    #[error("unknown run_id: {0}")]
    UnknownRun(String),
    #[error("no artifacts for run_id: {0}")]
    NoArtifacts(String),
    #[error("no artifacts for run_id: {run_id} type: {artifact_type}")]
    NoArtifactsOfType {
        run_id: String,
        artifact_type: String,
    },
    #[error("multiple artifacts for run_id: {run_id} type: {artifact_type}\n{}", .paths.join("\n"))]
    Ambiguous {
        run_id: String,
        artifact_type: String,
        paths: Vec<String>,
    },
}

/// A loaded index whose top level is known to be an object with a `runs` list.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    data: Map<String, Value>,
}

/// Load and minimally validate an index file.
pub fn load_index(path: &Path) -> Result<LoadedIndex, QueryError> {
    if !path.exists() {
        return Err(QueryError::NotFound(path.to_path_buf()));
    }
    let contents =
        fs::read_to_string(path).map_err(|_| QueryError::InvalidJson(path.to_path_buf()))?;
    let value: Value =
        serde_json::from_str(&contents).map_err(|_| QueryError::InvalidJson(path.to_path_buf()))?;
    let Value::Object(data) = value else {
        return Err(QueryError::InvalidSchema(
            "top-level JSON must be an object",
        ));
    };
    match data.get("runs") {
        None => Err(QueryError::InvalidSchema("missing runs")),
        Some(Value::Array(_)) => Ok(LoadedIndex { data }),
        Some(_) => Err(QueryError::InvalidSchema("runs must be a list")),
    }
}

impl LoadedIndex {
    fn runs(&self) -> impl Iterator<Item = &Map<String, Value>> {
        self.data
            .get("runs")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object)
    }

    fn run_count(&self) -> usize {
        self.data
            .get("runs")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    fn find_run(&self, run_id: &str) -> Option<&Map<String, Value>> {
        self.runs()
            .find(|run| run.get("run_id").and_then(Value::as_str) == Some(run_id))
    }

    fn artifacts_for(&self, run_id: &str) -> Result<Vec<&Map<String, Value>>, QueryError> {
        let run = self
            .find_run(run_id)
            .ok_or_else(|| QueryError::UnknownRun(run_id.to_string()))?;
        let artifacts = run
            .get("artifacts")
            .and_then(Value::as_array)
            .filter(|artifacts| !artifacts.is_empty())
            .ok_or_else(|| QueryError::NoArtifacts(run_id.to_string()))?;
        Ok(artifacts.iter().filter_map(Value::as_object).collect())
    }
}

/// `<run_id>\t<run_dir>` per run, sorted by `(run_id, run_dir)`.
pub fn list_runs(index: &LoadedIndex) -> Vec<String> {
    let mut rows: Vec<(String, String)> = index
        .runs()
        .map(|run| (field(run, "run_id"), field(run, "run_dir")))
        .collect();
    rows.sort();
    rows.into_iter()
        .map(|(run_id, run_dir)| format!("{run_id}\t{run_dir}"))
        .collect()
}

/// `<type>\t<path>\t<schema_version or ->` per artifact, sorted by `(type, path)`.
pub fn list_artifacts(index: &LoadedIndex, run_id: &str) -> Result<Vec<String>, QueryError> {
    let mut rows: Vec<(String, String, String)> = index
        .artifacts_for(run_id)?
        .into_iter()
        .map(|artifact| {
            let version = match artifact.get("schema_version") {
                Some(Value::Number(n)) if n.is_i64() || n.is_u64() => n.to_string(),
                _ => "-".to_string(),
            };
            (field(artifact, "type"), field(artifact, "path"), version)
        })
        .collect();
    rows.sort();
    Ok(rows
        .into_iter()
        .map(|(artifact_type, path, version)| format!("{artifact_type}\t{path}\t{version}"))
        .collect())
}

/// Path of the single artifact of `artifact_type` in the run.
pub fn show_artifact(
    index: &LoadedIndex,
    run_id: &str,
    artifact_type: &str,
) -> Result<String, QueryError> {
    let mut paths: Vec<String> = index
        .artifacts_for(run_id)?
        .into_iter()
        .filter(|artifact| artifact.get("type").and_then(Value::as_str) == Some(artifact_type))
        .map(|artifact| field(artifact, "path"))
        .collect();
    match paths.len() {
        0 => Err(QueryError::NoArtifactsOfType {
            run_id: run_id.to_string(),
            artifact_type: artifact_type.to_string(),
        }),
        1 => Ok(paths.remove(0)),
        _ => {
            paths.sort();
            Err(QueryError::Ambiguous {
                run_id: run_id.to_string(),
                artifact_type: artifact_type.to_string(),
                paths,
            })
        }
    }
}

/// Four `key\tvalue` lines describing the index itself.
pub fn show_index_meta(index: &LoadedIndex) -> Vec<String> {
    let roots = index
        .data
        .get("roots_scanned")
        .and_then(Value::as_array)
        .map(|roots| roots.iter().map(display_value).collect::<Vec<_>>().join(","))
        .unwrap_or_default();
    vec![
        format!("schema_version\t{}", meta_value(index.data.get("schema_version"))),
        format!("generated_at\t{}", meta_value(index.data.get("generated_at"))),
        format!("roots_scanned\t{roots}"),
        format!("run_count\t{}", index.run_count()),
    ]
}

fn field(object: &Map<String, Value>, key: &str) -> String {
    object.get(key).map(display_value).unwrap_or_default()
}

fn meta_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "None".to_string(),
        Some(value) => display_value(value),
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> LoadedIndex {
        let payload = serde_json::json!({
            "generated_at": "2025-01-01T00:00:00Z",
            "roots_scanned": [".orchestrator_logs", "external_logs"],
            "runs": [
                {
                    "run_id": "run-b",
                    "run_dir": ".orchestrator_logs/run-b",
                    "manifest_path": ".orchestrator_logs/run-b/manifest.json",
                    "artifacts": [
                        {"type": "review_report", "path": ".orchestrator_logs/run-b/z/review_report.json", "schema_version": 2},
                        {"type": "manifest", "path": ".orchestrator_logs/run-b/manifest.json", "schema_version": null},
                        {"type": "review_report", "path": ".orchestrator_logs/run-b/a/review_report.json", "schema_version": "x"}
                    ]
                },
                {
                    "run_id": "run-a",
                    "run_dir": ".orchestrator_logs/run-a",
                    "manifest_path": ".orchestrator_logs/run-a/manifest.json",
                    "artifacts": [
                        {"type": "manifest", "path": ".orchestrator_logs/run-a/manifest.json", "schema_version": null}
                    ]
                },
                {
                    "run_id": "run-empty",
                    "run_dir": ".orchestrator_logs/run-empty",
                    "manifest_path": null,
                    "artifacts": []
                }
            ],
            "schema_version": 1
        });
        let Value::Object(data) = payload else {
            panic!("sample index must be an object");
        };
        LoadedIndex { data }
    }

    #[test]
    fn list_runs_is_sorted() {
        assert_eq!(
            list_runs(&sample_index()),
            vec![
                "run-a\t.orchestrator_logs/run-a",
                "run-b\t.orchestrator_logs/run-b",
                "run-empty\t.orchestrator_logs/run-empty",
            ]
        );
    }

    #[test]
    fn list_artifacts_sorts_and_renders_missing_versions_as_dash() {
        let lines = list_artifacts(&sample_index(), "run-b").expect("artifacts");
        assert_eq!(
            lines,
            vec![
                "manifest\t.orchestrator_logs/run-b/manifest.json\t-",
                "review_report\t.orchestrator_logs/run-b/a/review_report.json\t-",
                "review_report\t.orchestrator_logs/run-b/z/review_report.json\t2",
            ]
        );
    }

    #[test]
    fn list_artifacts_reports_unknown_and_empty_runs() {
        let index = sample_index();
        assert_eq!(
            list_artifacts(&index, "nope").unwrap_err().to_string(),
            "unknown run_id: nope"
        );
        assert_eq!(
            list_artifacts(&index, "run-empty").unwrap_err().to_string(),
            "no artifacts for run_id: run-empty"
        );
    }

    #[test]
    fn show_artifact_returns_single_match() {
        let path = show_artifact(&sample_index(), "run-a", "manifest").expect("path");
        assert_eq!(path, ".orchestrator_logs/run-a/manifest.json");
    }

    #[test]
    fn show_artifact_lists_sorted_paths_when_ambiguous() {
        let err = show_artifact(&sample_index(), "run-b", "review_report").unwrap_err();
        assert_eq!(
            err.to_string(),
            "multiple artifacts for run_id: run-b type: review_report\n\
             .orchestrator_logs/run-b/a/review_report.json\n\
             .orchestrator_logs/run-b/z/review_report.json"
        );
    }

    #[test]
    fn show_artifact_reports_missing_type() {
        let err = show_artifact(&sample_index(), "run-a", "review_report").unwrap_err();
        assert_eq!(
            err.to_string(),
            "no artifacts for run_id: run-a type: review_report"
        );
    }

    #[test]
    fn show_index_meta_prints_four_lines() {
        assert_eq!(
            show_index_meta(&sample_index()),
            vec![
                "schema_version\t1",
                "generated_at\t2025-01-01T00:00:00Z",
                "roots_scanned\t.orchestrator_logs,external_logs",
                "run_count\t3",
            ]
        );
    }

    #[test]
    fn load_index_validates_shape() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("evidence_index.json");

        assert_eq!(
            load_index(&path).unwrap_err(),
            QueryError::NotFound(path.clone())
        );

        fs::write(&path, "{").expect("write");
        assert_eq!(
            load_index(&path).unwrap_err(),
            QueryError::InvalidJson(path.clone())
        );

        fs::write(&path, "[]").expect("write");
        assert_eq!(
            load_index(&path).unwrap_err().to_string(),
            "invalid index schema: top-level JSON must be an object"
        );

        fs::write(&path, "{}").expect("write");
        assert_eq!(
            load_index(&path).unwrap_err().to_string(),
            "invalid index schema: missing runs"
        );

        fs::write(&path, r#"{"runs": {}}"#).expect("write");
        assert_eq!(
            load_index(&path).unwrap_err().to_string(),
            "invalid index schema: runs must be a list"
        );

        fs::write(&path, r#"{"runs": []}"#).expect("write");
        let index = load_index(&path).expect("load");
        assert!(list_runs(&index).is_empty());
    }
}
