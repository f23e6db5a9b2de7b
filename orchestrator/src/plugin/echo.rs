//! Reference plugin: writes a fixed file and a short markdown report.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value, json};

use crate::io::taskpack::TaskPack;
use crate::plugin::interface::{
    ExecutionContext, Plan, PluginCapabilities, RawOutput, SolutionPlugin, ValidationReport,
};

pub struct EchoPlugin;

impl SolutionPlugin for EchoPlugin {
    fn id(&self) -> &str {
        "security/echo"
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    fn capabilities(&self) -> PluginCapabilities {
        PluginCapabilities {
            requires_network: false,
            requires_cloud_mutations: false,
            produces_domain_result: false,
        }
    }

    fn validate(&self, _taskpack: &TaskPack, _ctx: &ExecutionContext) -> Result<ValidationReport> {
        Ok(ValidationReport::ok())
    }

    fn plan(&self, _taskpack: &TaskPack, _ctx: &ExecutionContext) -> Result<Plan> {
        Ok(Plan {
            steps: vec![object(
                json!({"action": "write_file", "path": "echo.txt", "content": "hello"}),
            )],
            expected_artifacts: vec![
                "echo.txt".to_string(),
                "echo_report.md".to_string(),
                "plugin_result.json".to_string(),
            ],
            metadata: object(json!({"note": "echo plugin plan"})),
        })
    }

    fn run(&self, plan: &Plan, ctx: &ExecutionContext) -> Result<RawOutput> {
        let mut written = Vec::new();
        for step in &plan.steps {
            match step.get("action").and_then(Value::as_str) {
                Some("write_file") => {
                    let rel = step
                        .get("path")
                        .and_then(Value::as_str)
                        .context("write_file step missing 'path'")?;
                    let content = step.get("content").and_then(Value::as_str).unwrap_or("");
                    let out = ctx.artifact_dir.join(rel);
                    fs::write(&out, content).with_context(|| format!("write {}", out.display()))?;
                    ctx.log(&format!("echo: wrote {rel}"));
                    written.push(out);
                }
                other => bail!("Unknown step action: {}", other.unwrap_or("None")),
            }
        }
        Ok(RawOutput {
            artifacts: written,
            metadata: object(json!({"steps_ran": plan.steps.len()})),
        })
    }

    fn report(&self, raw: &RawOutput, ctx: &ExecutionContext) -> Result<Vec<PathBuf>> {
        let mut body = format!(
            "# Echo Plugin Report\n\nRun ID: `{}`\n\n## Artifacts\n",
            ctx.run_id
        );
        for artifact in &raw.artifacts {
            let name = artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            body.push_str(&format!("- {name}\n"));
        }
        let report_path = ctx.artifact_dir.join("echo_report.md");
        fs::write(&report_path, body)
            .with_context(|| format!("write {}", report_path.display()))?;
        Ok(vec![report_path])
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
