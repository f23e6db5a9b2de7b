//! Capability-gated plugin execution: validate → plan → run → report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::io::manifest::write_atomic;
use crate::io::taskpack::TaskPack;
use crate::plugin::interface::{ExecutionContext, SolutionPlugin, ValidationReport};

pub const RESULT_FILENAME: &str = "plugin_result.json";

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Plugin '{0}' requires network, but taskpack constraints disallow it.")]
    NetworkDenied(String),
    #[error("Plugin '{0}' requires cloud mutations, but constraints disallow it.")]
    CloudMutationsDenied(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginStatus {
    Ok,
    ValidationFailed,
}

impl PluginStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginStatus::Ok => "OK",
            PluginStatus::ValidationFailed => "VALIDATION_FAILED",
        }
    }
}

/// Summary of a completed plugin run. The full result is on disk at `result_path`.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginRun {
    pub status: PluginStatus,
    pub id: String,
    pub version: String,
    pub result_path: PathBuf,
    pub result: Value,
}

/// Execute the plugin protocol and write `<artifact_dir>/plugin_result.json`.
///
/// Capabilities are checked against `ctx.constraints` before any other plugin
/// call. A failed validation is a result, not an error.
#[instrument(skip_all, fields(plugin = plugin.id(), run_id = %ctx.run_id))]
pub fn run_plugin(
    plugin: &dyn SolutionPlugin,
    taskpack: &TaskPack,
    ctx: &ExecutionContext,
) -> Result<PluginRun, PluginError> {
    let id = plugin.id().to_string();
    let version = plugin.version().to_string();
    let caps = plugin.capabilities();
    if caps.requires_network && !ctx.constraints.allow_network {
        return Err(PluginError::NetworkDenied(id));
    }
    if caps.requires_cloud_mutations && !ctx.constraints.allow_cloud_mutations {
        return Err(PluginError::CloudMutationsDenied(id));
    }

    fs::create_dir_all(&ctx.artifact_dir)
        .with_context(|| format!("create artifact dir {}", ctx.artifact_dir.display()))?;
    let identity = json!({"id": id, "version": version});

    let validation = plugin.validate(taskpack, ctx)?;
    if !validation.ok {
        info!(errors = validation.errors.len(), "plugin validation failed");
        let result = json!({
            "plugin": identity,
            "validation": validation_json(false, &validation),
            "status": PluginStatus::ValidationFailed.as_str(),
        });
        return finish(ctx, PluginStatus::ValidationFailed, id, version, result);
    }

    let plan = plugin.plan(taskpack, ctx)?;
    debug!(steps = plan.steps.len(), "plugin plan ready");
    let raw = plugin.run(&plan, ctx)?;
    let reports = plugin.report(&raw, ctx)?;

    let result = json!({
        "plugin": identity,
        "validation": {"ok": true, "errors": [], "warnings": validation.warnings},
        "plan": {
            "metadata": plan.metadata,
            "expected_artifacts": plan.expected_artifacts,
            "steps_count": plan.steps.len(),
        },
        "raw": {
            "metadata": raw.metadata,
            "artifacts": relative_artifacts(&ctx.artifact_dir, &raw.artifacts),
        },
        "report_artifacts": relative_artifacts(&ctx.artifact_dir, &reports),
        "status": PluginStatus::Ok.as_str(),
    });
    finish(ctx, PluginStatus::Ok, id, version, result)
}

fn validation_json(ok: bool, report: &ValidationReport) -> Value {
    json!({"ok": ok, "errors": report.errors, "warnings": report.warnings})
}

fn finish(
    ctx: &ExecutionContext,
    status: PluginStatus,
    id: String,
    version: String,
    result: Value,
) -> Result<PluginRun, PluginError> {
    let result = sort_keys(result);
    let result_path = ctx.artifact_dir.join(RESULT_FILENAME);
    let mut buf = serde_json::to_string_pretty(&result).context("serialize plugin result")?;
    buf.push('\n');
    write_atomic(&result_path, &buf)?;
    info!(status = status.as_str(), path = %result_path.display(), "plugin result written");
    Ok(PluginRun {
        status,
        id,
        version,
        result_path,
        result,
    })
}

/// Paths inside `artifact_dir` become relative to it; others pass through.
fn relative_artifacts(artifact_dir: &Path, artifacts: &[PathBuf]) -> Vec<String> {
    artifacts
        .iter()
        .map(|artifact| {
            artifact
                .strip_prefix(artifact_dir)
                .ok()
                .filter(|rel| !rel.as_os_str().is_empty())
                .unwrap_or(artifact.as_path())
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect()
}

/// Recursively reorder object keys lexicographically.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
