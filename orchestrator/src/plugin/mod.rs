//! Solution plugins: protocol, registry, runner and the orchestrator stage.

pub mod echo;
pub mod interface;
pub mod registry;
pub mod runner;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::io::manifest::ManifestStore;
use crate::io::taskpack::TaskPack;
use crate::plugin::interface::ExecutionContext;
use crate::plugin::registry::PluginRegistry;
use crate::plugin::runner::run_plugin;
use crate::run::RunContext;

/// Manifest status when the plugin stage was not run.
pub const STATUS_SKIPPED: &str = "SKIPPED";
/// Manifest status when loading or running the plugin failed.
pub const STATUS_ERROR: &str = "ERROR";

/// Run the task pack's plugin when enabled, recording the outcome under the
/// manifest's `plugin` key.
///
/// Returns the manifest status. Plugin failures are recorded and swallowed
/// unless `strict`.
#[instrument(skip_all, fields(enabled = enabled, strict = strict))]
pub fn run_plugin_stage(
    registry: &PluginRegistry,
    taskpack: &TaskPack,
    run: &RunContext,
    manifest: &mut ManifestStore,
    enabled: bool,
    strict: bool,
) -> Result<Option<String>> {
    let spec = taskpack.plugin.as_deref();
    manifest.set("plugins_enabled", json!(enabled))?;
    manifest.set("plugin", json!({"spec": spec, "status": STATUS_SKIPPED}))?;
    if !enabled {
        return Ok(None);
    }
    let Some(spec) = spec else {
        info!("plugins enabled but task pack names no plugin");
        manifest.set(
            "plugin",
            json!({"spec": Value::Null, "status": STATUS_SKIPPED, "reason": "taskpack.task.plugin missing"}),
        )?;
        return Ok(Some(STATUS_SKIPPED.to_string()));
    };

    let ctx = ExecutionContext::new(
        run.run_id.clone(),
        taskpack.path.clone(),
        run.plugin_workspace_dir(),
        taskpack.constraints,
        run.plugin_artifact_dir(&taskpack.id),
        run.plugin_log_path(&taskpack.id),
    );
    let outcome = registry
        .load(Some(spec))
        .map_err(anyhow::Error::from)
        .and_then(|plugin| {
            std::fs::create_dir_all(&ctx.workspace_dir).with_context(|| {
                format!("create plugin workspace {}", ctx.workspace_dir.display())
            })?;
            run_plugin(plugin.as_ref(), taskpack, &ctx).map_err(anyhow::Error::from)
        });

    match outcome {
        Ok(result) => {
            let status = result.status.as_str();
            manifest.set(
                "plugin",
                json!({
                    "spec": spec,
                    "status": status,
                    "result_path": run.relative_to_base(&result.result_path),
                    "id": result.id,
                    "version": result.version,
                }),
            )?;
            Ok(Some(status.to_string()))
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(spec, err = %message, "plugin failed");
            manifest.set(
                "plugin",
                json!({"spec": spec, "status": STATUS_ERROR, "errors": [{"error": message}]}),
            )?;
            if strict {
                return Err(anyhow!("plugin '{spec}' failed: {message}"));
            }
            Ok(Some(STATUS_ERROR.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::types::EvidenceMode;
    use crate::io::manifest::load_manifest;
    use crate::io::workspace::WorkspaceConfig;
    use crate::test_support::{TaskPackBuilder, write_taskpack};

    struct Fixture {
        _temp: tempfile::TempDir,
        taskpack: TaskPack,
        run: RunContext,
        manifest: ManifestStore,
    }

    fn fixture(task_yml: &str) -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().to_path_buf();
        write_taskpack(&root.join("tp"), &TaskPackBuilder::default().task_yml(task_yml));
        let taskpack = TaskPack::load(&root.join("tp")).expect("load");
        let evidence_root = root.join(".orchestrator_logs");
        let run = RunContext {
            run_id: "task-1-5".to_string(),
            branch_name: "codex/task-1-5".to_string(),
            base_branch: "main".to_string(),
            log_dir: evidence_root.join("task-1-5"),
            evidence_root,
            workspace: WorkspaceConfig {
                name: Some("self".to_string()),
                root: root.clone(),
                kind: "local_path".to_string(),
                evidence_mode: EvidenceMode::InRepo,
                evidence_dir: None,
                acceptance: Vec::new(),
            },
            orchestrator_root: root,
        };
        let manifest = ManifestStore::open(&run.manifest_path()).expect("manifest");
        Fixture {
            _temp: temp,
            taskpack,
            run,
            manifest,
        }
    }

    const WITH_ECHO: &str = "id: TASK-1\ntitle: One\nconstraints:\n  allow_network: false\n  allow_cloud_mutations: false\nplugin: solutions.security.echo.plugin:EchoPlugin\n";
    const WITH_BAD: &str = "id: TASK-1\ntitle: One\nconstraints:\n  allow_network: false\n  allow_cloud_mutations: false\nplugin: tools.evil:Plugin\n";

    #[test]
    fn disabled_stage_records_skip_without_running() {
        let mut f = fixture(WITH_ECHO);

        let status = run_plugin_stage(
            &PluginRegistry::builtin(),
            &f.taskpack,
            &f.run,
            &mut f.manifest,
            false,
            false,
        )
        .expect("stage");

        assert_eq!(status, None);
        assert_eq!(f.manifest.get("plugins_enabled"), Some(&json!(false)));
        assert_eq!(
            f.manifest.get("plugin"),
            Some(&json!({"spec": "solutions.security.echo.plugin:EchoPlugin", "status": "SKIPPED"}))
        );
        assert!(!f.run.plugin_artifact_dir("TASK-1").exists());
    }

    #[test]
    fn missing_spec_records_reason() {
        let mut f = fixture("id: TASK-1\ntitle: One\nconstraints: {}\n");

        let status = run_plugin_stage(
            &PluginRegistry::builtin(),
            &f.taskpack,
            &f.run,
            &mut f.manifest,
            true,
            true,
        )
        .expect("stage");

        assert_eq!(status.as_deref(), Some("SKIPPED"));
        assert_eq!(
            f.manifest.get("plugin"),
            Some(&json!({"spec": null, "status": "SKIPPED", "reason": "taskpack.task.plugin missing"}))
        );
    }

    /// Verifies a successful echo run records identity and a base-relative result path.
    #[test]
    fn echo_plugin_success_is_recorded() {
        let mut f = fixture(WITH_ECHO);

        let status = run_plugin_stage(
            &PluginRegistry::builtin(),
            &f.taskpack,
            &f.run,
            &mut f.manifest,
            true,
            false,
        )
        .expect("stage");

        assert_eq!(status.as_deref(), Some("OK"));
        let manifest = load_manifest(&f.run.manifest_path()).expect("reload");
        assert_eq!(
            manifest.get("plugin"),
            Some(&json!({
                "spec": "solutions.security.echo.plugin:EchoPlugin",
                "status": "OK",
                "result_path": ".orchestrator_logs/task-1-5/plugin/TASK-1/plugin_result.json",
                "id": "security/echo",
                "version": "0.1.0"
            }))
        );
        let log = fs::read_to_string(f.run.plugin_log_path("TASK-1")).expect("plugin log");
        assert!(log.contains("echo: wrote echo.txt"));
    }

    #[test]
    fn load_failure_is_non_fatal_unless_strict() {
        let mut f = fixture(WITH_BAD);
        let registry = PluginRegistry::builtin();

        let status = run_plugin_stage(&registry, &f.taskpack, &f.run, &mut f.manifest, true, false)
            .expect("stage");
        assert_eq!(status.as_deref(), Some("ERROR"));
        let plugin = f.manifest.get("plugin").expect("plugin");
        assert_eq!(plugin["status"], json!("ERROR"));
        assert!(
            plugin["errors"][0]["error"]
                .as_str()
                .expect("error")
                .contains("outside the allowed")
        );

        let err = run_plugin_stage(&registry, &f.taskpack, &f.run, &mut f.manifest, true, true)
            .unwrap_err();
        assert!(err.to_string().contains("tools.evil:Plugin"));
        assert_eq!(f.manifest.get("plugin").expect("plugin")["status"], json!("ERROR"));
    }
}
