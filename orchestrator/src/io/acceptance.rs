//! Acceptance runner: the ground-truth checks executed outside the agent.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command, shell_command};
use crate::io::taskpack::TaskPack;

pub const WARNINGS_LOG: &str = "acceptance_warnings.log";
const PYTEST_NO_TESTS_COLLECTED: i32 = 5;

#[derive(Debug, Error)]
pub enum AcceptanceError {
    #[error("acceptance command failed ({group}[{index}], exit {code:?}): {command}\nsee {}", log.display())]
    CommandFailed {
        group: &'static str,
        index: usize,
        command: String,
        code: Option<i32>,
        log: PathBuf,
    },
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// How the acceptance run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptanceOutcome {
    Passed { commands_run: usize },
    /// A pytest command collected no tests; remaining commands were not run.
    NoTestsCollected { command: String },
}

/// Command groups in run order. An empty `tests` group falls back to the
/// workspace acceptance list.
pub fn acceptance_groups<'a>(
    taskpack: &'a TaskPack,
    workspace_acceptance: &'a [String],
) -> [(&'static str, &'a [String]); 3] {
    let tests = if taskpack.acceptance.tests.commands.is_empty() {
        workspace_acceptance
    } else {
        taskpack.acceptance.tests.commands.as_slice()
    };
    [
        ("format", taskpack.acceptance.format.commands.as_slice()),
        ("lint", taskpack.acceptance.lint.commands.as_slice()),
        ("tests", tests),
    ]
}

/// Run `format`, `lint` and `tests` commands via `sh -c` in `workdir`.
///
/// Each command's output lands in `<log_dir>/acceptance_<group>_<i>.log`.
#[instrument(skip_all, fields(workdir = %workdir.display()))]
pub fn run_acceptance(
    taskpack: &TaskPack,
    workspace_acceptance: &[String],
    workdir: &Path,
    log_dir: &Path,
) -> Result<AcceptanceOutcome, AcceptanceError> {
    fs::create_dir_all(log_dir).with_context(|| format!("create {}", log_dir.display()))?;
    let mut commands_run = 0;

    for (group, commands) in acceptance_groups(taskpack, workspace_acceptance) {
        for (index, command) in commands.iter().enumerate() {
            let log = log_dir.join(format!("acceptance_{group}_{index}.log"));
            debug!(group, index, command = %command, "running acceptance command");
            let output = run_command(
                shell_command(command, workdir),
                None,
                None,
                DEFAULT_OUTPUT_LIMIT_BYTES,
            )
            .with_context(|| format!("run acceptance command {command}"))?;
            fs::write(&log, output.combined_text("acceptance"))
                .with_context(|| format!("write {}", log.display()))?;
            commands_run += 1;

            if output.success() {
                continue;
            }
            if group == "tests"
                && command.contains("pytest")
                && output.code() == Some(PYTEST_NO_TESTS_COLLECTED)
            {
                let warnings = log_dir.join(WARNINGS_LOG);
                fs::write(
                    &warnings,
                    "pytest reported no tests collected (exit code 5)\n",
                )
                .with_context(|| format!("write {}", warnings.display()))?;
                warn!(command = %command, "pytest collected no tests; stopping acceptance run");
                return Ok(AcceptanceOutcome::NoTestsCollected {
                    command: command.clone(),
                });
            }
            return Err(AcceptanceError::CommandFailed {
                group,
                index,
                command: command.clone(),
                code: output.code(),
                log,
            });
        }
    }
    info!(commands_run, "acceptance passed");
    Ok(AcceptanceOutcome::Passed { commands_run })
}
