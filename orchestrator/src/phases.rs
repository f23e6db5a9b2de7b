//! Phase state machine: planner → implementer → verifier → security → pr_author.
//!
//! Each phase gets up to `max_attempts` agent invocations. Exhausting the
//! budget commits and pushes whatever exists, then fails the run.

use std::io::Write;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::types::{Phase, PhaseStatus};
use crate::io::executor::{AgentExecutor, AgentRequest, write_agent_log};
use crate::io::git::Git;
use crate::io::manifest::ManifestStore;
use crate::io::prompt::PromptEngine;
use crate::io::publish::PushTarget;
use crate::io::taskpack::TaskPack;
use crate::run::RunContext;

#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Phase failed after {attempts} attempts: {phase}")]
    Exhausted { phase: Phase, attempts: u32 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Retry and dry-run knobs for the phase loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhasePolicy {
    /// False means a dry run: no agent is invoked.
    pub run_agent: bool,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

/// Collaborators the phase loop drives.
pub struct PhaseDeps<'a, E: AgentExecutor> {
    pub executor: &'a E,
    pub prompts: &'a PromptEngine,
    pub git: &'a Git,
    pub push: &'a PushTarget,
}

/// Run every phase in order, recording `phases.<phase>` in the manifest.
#[instrument(skip_all, fields(task = %taskpack.id, run_agent = policy.run_agent))]
pub fn run_phases<E: AgentExecutor>(
    deps: &PhaseDeps<'_, E>,
    taskpack: &TaskPack,
    run: &RunContext,
    manifest: &mut ManifestStore,
    policy: &PhasePolicy,
    out: &mut dyn Write,
) -> Result<(), PhaseError> {
    for phase in Phase::ALL {
        if !policy.run_agent {
            manifest.set_phase(phase.as_str(), PhaseStatus::Skipped.as_str(), 0)?;
            writeln!(out, "[skip] Codex phase '{phase}' (RUN_CODEX_SMOKE=false)")
                .context("write progress")?;
            continue;
        }
        run_phase(deps, taskpack, run, manifest, policy, phase)?;
    }
    Ok(())
}

#[instrument(skip_all, fields(phase = %phase))]
fn run_phase<E: AgentExecutor>(
    deps: &PhaseDeps<'_, E>,
    taskpack: &TaskPack,
    run: &RunContext,
    manifest: &mut ManifestStore,
    policy: &PhasePolicy,
    phase: Phase,
) -> Result<(), PhaseError> {
    for attempt in 1..=policy.max_attempts {
        let prompt = deps.prompts.render(taskpack, phase)?;
        let request = AgentRequest {
            workdir: run.workspace.root.clone(),
            prompt,
            log_path: run.log_dir.join(format!("{phase}_attempt{attempt}.log")),
        };
        let succeeded = match deps.executor.invoke(&request) {
            Ok(agent_run) => agent_run.success(),
            Err(err) => {
                let message = format!("{err:#}");
                warn!(attempt, err = %message, "agent invocation failed");
                write_agent_log(&request.log_path, &format!("agent invocation failed: {message}\n"))?;
                false
            }
        };

        if succeeded {
            info!(attempt, "phase succeeded");
            manifest.set_phase(phase.as_str(), PhaseStatus::Success.as_str(), attempt)?;
            if phase.commits_outputs() {
                let message = format!("chore: {phase} outputs for {}", taskpack.id);
                deps.git.commit_all(&message)?;
            }
            return Ok(());
        }
        if attempt < policy.max_attempts {
            debug!(attempt, delay_ms = policy.retry_delay.as_millis() as u64, "retrying phase");
            thread::sleep(policy.retry_delay);
        }
    }

    warn!(attempts = policy.max_attempts, "phase exhausted its attempts");
    manifest.set_phase(
        phase.as_str(),
        PhaseStatus::Failed.as_str(),
        policy.max_attempts,
    )?;
    deps.git
        .commit_all(&format!("chore: partial changes before failure in {phase}"))?;
    if let Err(err) = deps.push.push(deps.git) {
        warn!(err = %format!("{err:#}"), "push of partial changes failed");
    }
    Err(PhaseError::Exhausted {
        phase,
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::core::types::EvidenceMode;
    use crate::io::workspace::WorkspaceConfig;
    use crate::test_support::{ScriptedAgent, TaskPackBuilder, TestRepo, write_taskpack};

    struct Fixture {
        repo: TestRepo,
        taskpack: TaskPack,
        run: RunContext,
        manifest: ManifestStore,
        prompts: PromptEngine,
        push: PushTarget,
    }

    fn fixture() -> Fixture {
        let repo = TestRepo::with_origin();
        let root = repo.path().to_path_buf();
        let tp = root.join("tp");
        write_taskpack(&tp, &TaskPackBuilder::default());
        let taskpack = TaskPack::load(&tp).expect("load");
        let git = Git::new(&root);
        git.commit_all("add task pack").expect("commit");
        git.checkout_or_create("codex/task-1-9").expect("branch");

        // Evidence lives outside the repo so it never shows up in commits.
        let evidence_root = repo.scratch().join("evidence");
        let run = RunContext {
            run_id: "task-1-9".to_string(),
            branch_name: "codex/task-1-9".to_string(),
            base_branch: "main".to_string(),
            log_dir: evidence_root.join("task-1-9"),
            evidence_root: evidence_root.clone(),
            workspace: WorkspaceConfig {
                name: Some("self".to_string()),
                root: root.clone(),
                kind: "local_path".to_string(),
                evidence_mode: EvidenceMode::ExternalDir,
                evidence_dir: Some(evidence_root),
                acceptance: Vec::new(),
            },
            orchestrator_root: root,
        };
        let manifest = ManifestStore::open(&run.manifest_path()).expect("manifest");
        Fixture {
            repo,
            taskpack,
            run,
            manifest,
            prompts: PromptEngine::new(),
            push: PushTarget {
                remote: "origin".to_string(),
                ci: None,
            },
        }
    }

    fn policy(run_agent: bool, max_attempts: u32) -> PhasePolicy {
        PhasePolicy {
            run_agent,
            max_attempts,
            retry_delay: Duration::ZERO,
        }
    }

    /// Verifies a dry run records every phase as skipped and never invokes the agent.
    #[test]
    fn dry_run_skips_every_phase() {
        let mut f = fixture();
        let agent = ScriptedAgent::new(Vec::new());
        let git = Git::new(f.repo.path());
        let deps = PhaseDeps {
            executor: &agent,
            prompts: &f.prompts,
            git: &git,
            push: &f.push,
        };
        let mut out = Vec::new();

        run_phases(&deps, &f.taskpack, &f.run, &mut f.manifest, &policy(false, 2), &mut out)
            .expect("phases");

        assert!(agent.requests().is_empty());
        let printed = String::from_utf8(out).expect("utf8");
        assert_eq!(printed.lines().count(), 5);
        assert_eq!(
            printed.lines().next(),
            Some("[skip] Codex phase 'planner' (RUN_CODEX_SMOKE=false)")
        );
        assert_eq!(
            f.manifest.get("phases"),
            Some(&json!({
                "planner": {"status": "skipped", "attempts": 0},
                "implementer": {"status": "skipped", "attempts": 0},
                "verifier": {"status": "skipped", "attempts": 0},
                "security": {"status": "skipped", "attempts": 0},
                "pr_author": {"status": "skipped", "attempts": 0}
            }))
        );
    }

    /// Ensures a retry after one failure succeeds, logs both attempts, and commits outputs.
    #[test]
    fn retry_then_success_commits_phase_outputs() {
        let mut f = fixture();
        // planner fails once, then writes its plan; later phases change nothing.
        let agent = ScriptedAgent::new(vec![1, 0, 0, 0, 0, 0]).writing_on_call(1, "plan.md", "the plan");
        let git = Git::new(f.repo.path());
        let deps = PhaseDeps {
            executor: &agent,
            prompts: &f.prompts,
            git: &git,
            push: &f.push,
        };

        run_phases(&deps, &f.taskpack, &f.run, &mut f.manifest, &policy(true, 2), &mut Vec::new())
            .expect("phases");

        let requests = agent.requests();
        assert_eq!(requests.len(), 6);
        assert!(requests[0].prompt.starts_with("You are the Planner Agent."));
        assert!(f.run.log_dir.join("planner_attempt1.log").is_file());
        assert!(f.run.log_dir.join("planner_attempt2.log").is_file());
        assert_eq!(
            f.manifest.get("phases").and_then(|p| p.get("planner")),
            Some(&json!({"status": "success", "attempts": 2}))
        );
        assert_eq!(
            f.repo.log_subjects(1),
            vec![format!("chore: planner outputs for {}", f.taskpack.id)]
        );
    }

    /// Verifies exhaustion commits partial work, pushes it, and fails with the phase name.
    #[test]
    fn exhausted_phase_commits_pushes_and_fails() {
        let mut f = fixture();
        let agent = ScriptedAgent::new(vec![0, 3, 3]).writing_on_call(1, "partial.txt", "wip");
        let git = Git::new(f.repo.path());
        let deps = PhaseDeps {
            executor: &agent,
            prompts: &f.prompts,
            git: &git,
            push: &f.push,
        };

        let err = run_phases(&deps, &f.taskpack, &f.run, &mut f.manifest, &policy(true, 2), &mut Vec::new())
            .unwrap_err();

        assert_eq!(err.to_string(), "Phase failed after 2 attempts: implementer");
        assert_eq!(
            f.manifest.get("phases").and_then(|p| p.get("implementer")),
            Some(&json!({"status": "failed", "attempts": 2}))
        );
        assert_eq!(
            f.repo.log_subjects(1),
            vec!["chore: partial changes before failure in implementer".to_string()]
        );
        let head = git.rev_parse("HEAD").expect("head");
        assert_eq!(f.repo.origin_rev("codex/task-1-9"), head);
        assert!(fs::read_to_string(f.run.log_dir.join("implementer_attempt2.log")).is_ok());
        assert!(f.manifest.get("phases").and_then(|p| p.get("verifier")).is_none());
    }
}
