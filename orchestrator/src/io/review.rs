//! Advisory review report collection.
//!
//! Runs the configured review command once, classifies its exit code and
//! records the report in the manifest. Never fails the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use evidence::schemas::REVIEW_REPORT_FILENAME;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::io::manifest::ManifestStore;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command};

const DEFAULT_REVIEW_SCHEMA_VERSION: i64 = 1;

/// Review classification derived from the command's exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pass,
    Violations,
    Error,
}

impl ReviewStatus {
    pub fn from_exit_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ReviewStatus::Pass,
            Some(2) => ReviewStatus::Violations,
            _ => ReviewStatus::Error,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pass => "pass",
            ReviewStatus::Violations => "violations",
            ReviewStatus::Error => "error",
        }
    }
}

/// What was collected; used for the operator progress line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    pub status: ReviewStatus,
    pub report_path: PathBuf,
}

/// Run `review_command --mode advisory --report-path <log_dir>/review_report.json`
/// in `workdir` and record the result in the manifest.
///
/// `review_report_path` is stored relative to `evidence_base`.
#[instrument(skip_all, fields(log_dir = %log_dir.display()))]
pub fn collect_review_report(
    manifest: &mut ManifestStore,
    review_command: &[String],
    workdir: &Path,
    log_dir: &Path,
    evidence_base: &Path,
) -> Result<ReviewOutcome> {
    let report_path = log_dir.join(REVIEW_REPORT_FILENAME);
    let Some((program, args)) = review_command.split_first() else {
        warn!("review requested but no review_command configured");
        manifest.set("review_status", json!(ReviewStatus::Error.as_str()))?;
        manifest.set("review_error", json!("review_command_not_configured"))?;
        return Ok(ReviewOutcome {
            status: ReviewStatus::Error,
            report_path,
        });
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .args(["--mode", "advisory", "--report-path"])
        .arg(&report_path)
        .current_dir(workdir);
    let status = match run_command(cmd, None, None, DEFAULT_OUTPUT_LIMIT_BYTES) {
        Ok(output) => ReviewStatus::from_exit_code(output.code()),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "review command could not be run");
            ReviewStatus::Error
        }
    };
    debug!(status = status.as_str(), "review command finished");

    if report_path.is_file() {
        let relative = report_path
            .strip_prefix(evidence_base)
            .unwrap_or(&report_path)
            .to_string_lossy()
            .replace('\\', "/");
        manifest.set("review_report_path", json!(relative))?;
        manifest.set(
            "review_schema_version",
            json!(report_schema_version(&report_path)),
        )?;
        manifest.set("review_status", json!(status.as_str()))?;
    } else {
        manifest.set("review_status", json!(ReviewStatus::Error.as_str()))?;
        manifest.set("review_error", json!("review_report_missing"))?;
    }
    Ok(ReviewOutcome {
        status,
        report_path,
    })
}

/// Integer `schema_version` from the report, else the current default.
fn report_schema_version(path: &Path) -> i64 {
    fs::read_to_string(path)
        .with_context(|| format!("read {}", path.display()))
        .and_then(|s| serde_json::from_str::<Value>(&s).map_err(Into::into))
        .ok()
        .and_then(|v| v.get("schema_version").and_then(Value::as_i64))
        .unwrap_or(DEFAULT_REVIEW_SCHEMA_VERSION)
}
