//! One orchestrator invocation, end to end.
//!
//! The flow is: load the task pack, prepare the run, plugin stage, phases,
//! acceptance, contract checks, review and evidence index, push, pull request.
//! Collaborators that reach outside the machine (the agent, the PR CLI) are
//! injected so the whole flow runs against fakes in tests.

use std::io::Write;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument};

use crate::enforce::enforce_contract;
use crate::evidence::maybe_collect_evidence_index;
use crate::io::acceptance::{AcceptanceOutcome, run_acceptance};
use crate::io::config::Settings;
use crate::io::executor::AgentExecutor;
use crate::io::git::Git;
use crate::io::manifest::ManifestStore;
use crate::io::prompt::PromptEngine;
use crate::io::publish::{PrOutcome, PullRequests, PushTarget, open_pull_request};
use crate::io::review::collect_review_report;
use crate::io::taskpack::TaskPack;
use crate::phases::{PhaseDeps, PhasePolicy, run_phases};
use crate::plugin::registry::PluginRegistry;
use crate::plugin::run_plugin_stage;
use crate::run::RunContext;

/// External collaborators for a run.
pub struct Services<'a, E: AgentExecutor, P: PullRequests> {
    pub agent: &'a E,
    pub pull_requests: &'a P,
    pub plugins: &'a PluginRegistry,
}

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run: RunContext,
    pub pull_request: PrOutcome,
}

/// Run one task pack through every stage.
///
/// Progress lines go to `out`. Any returned error is fatal for the run; the
/// manifest keeps whatever was recorded up to that point.
#[instrument(skip_all, fields(taskpack = %settings.taskpack_path.display()))]
pub fn orchestrate<E: AgentExecutor, P: PullRequests>(
    settings: &Settings,
    services: &Services<'_, E, P>,
    unix_secs: u64,
    out: &mut dyn Write,
) -> Result<RunSummary> {
    let taskpack = TaskPack::load(&settings.taskpack_path)?;
    let run = RunContext::prepare(settings, &taskpack, unix_secs)?;
    info!(run_id = %run.run_id, workspace = %run.workspace.root.display(), "run started");

    let mut manifest = ManifestStore::open(&run.manifest_path())?;
    record_run_identity(&mut manifest, &taskpack, &run)?;

    let git = Git::new(&run.workspace.root);
    git.checkout_or_create(&run.branch_name)?;

    let status = run_plugin_stage(
        services.plugins,
        &taskpack,
        &run,
        &mut manifest,
        settings.enable_plugins,
        settings.plugins_strict,
    )?;
    if let Some(status) = status {
        let spec = taskpack.plugin.as_deref().unwrap_or("<none>");
        writeln!(out, "[plugin] {spec} -> {status}").context("write progress")?;
    }

    let push = PushTarget {
        remote: settings.remote.clone(),
        ci: settings.ci_remote.clone(),
    };
    let prompts = PromptEngine::new();
    let deps = PhaseDeps {
        executor: services.agent,
        prompts: &prompts,
        git: &git,
        push: &push,
    };
    let policy = PhasePolicy {
        run_agent: settings.run_agent,
        max_attempts: settings.max_attempts,
        retry_delay: settings.retry_delay,
    };
    run_phases(&deps, &taskpack, &run, &mut manifest, &policy, out)?;

    let acceptance = run_acceptance(
        &taskpack,
        &run.workspace.acceptance,
        &run.workspace.root,
        &run.log_dir,
    )?;
    if let AcceptanceOutcome::NoTestsCollected { command } = &acceptance {
        writeln!(out, "[acceptance] no tests collected: {command}").context("write progress")?;
    }
    git.commit_all(&format!("test: acceptance checks pass for {}", taskpack.id))?;

    enforce_contract(
        &taskpack,
        &run.workspace.root,
        &run.base_branch,
        !run.is_self_workspace(),
    )?;

    if settings.collect_review {
        let review = collect_review_report(
            &mut manifest,
            &settings.review_command,
            &run.workspace.root,
            &run.log_dir,
            run.evidence_base(),
        )?;
        writeln!(
            out,
            "[review] collected status={} report={}",
            review.status.as_str(),
            review.report_path.display()
        )
        .context("write progress")?;
    }
    maybe_collect_evidence_index(settings.write_evidence_index, &run, &mut manifest, out)?;

    push.push(&git)?;
    let pull_request = open_pull_request(
        services.pull_requests,
        &run.workspace.root,
        &taskpack,
        &run.log_dir,
        &run.branch_name,
        &run.base_branch,
    )?;
    match &pull_request {
        PrOutcome::AlreadyExists => {
            writeln!(out, "PR already exists for this branch; skipping creation.")
        }
        PrOutcome::Created(url) => writeln!(out, "PR: {url}"),
    }
    .context("write progress")?;

    manifest.set("result", json!("success"))?;
    writeln!(out, "Done. Branch: {}", run.branch_name).context("write progress")?;
    info!(run_id = %run.run_id, "run finished");

    Ok(RunSummary { run, pull_request })
}

fn record_run_identity(
    manifest: &mut ManifestStore,
    taskpack: &TaskPack,
    run: &RunContext,
) -> Result<()> {
    manifest.set("run_id", json!(run.run_id))?;
    manifest.set("task_id", json!(taskpack.id))?;
    manifest.set("branch", json!(run.branch_name))?;
    manifest.set("base_branch", json!(run.base_branch))?;
    manifest.set(
        "workspace",
        json!({
            "name": run.workspace.name,
            "root": run.workspace.root.display().to_string(),
            "evidence_mode": run.workspace.evidence_mode.as_str(),
        }),
    )
}
