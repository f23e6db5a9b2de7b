//! Shared deterministic types for orchestrator core logic.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Agent phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planner,
    Implementer,
    Verifier,
    Security,
    PrAuthor,
}

impl Phase {
    /// Every phase in the order the state machine runs them.
    pub const ALL: [Phase; 5] = [
        Phase::Planner,
        Phase::Implementer,
        Phase::Verifier,
        Phase::Security,
        Phase::PrAuthor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Planner => "planner",
            Phase::Implementer => "implementer",
            Phase::Verifier => "verifier",
            Phase::Security => "security",
            Phase::PrAuthor => "pr_author",
        }
    }

    /// Whether a successful run of this phase is followed by a commit.
    ///
    /// `pr_author` only writes the PR body into the task pack, which is
    /// published separately.
    pub fn commits_outputs(self) -> bool {
        !matches!(self, Phase::PrAuthor)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome recorded in the manifest for each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    /// Agent exited 0 within the attempt budget.
    Success,
    /// Every attempt exited non-zero.
    Failed,
    /// Dry run: the agent was not invoked.
    Skipped,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::Success => "success",
            PhaseStatus::Failed => "failed",
            PhaseStatus::Skipped => "skipped",
        }
    }
}

/// Where a workspace keeps its run evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceMode {
    /// `<workspace root>/.orchestrator_logs`.
    InRepo,
    /// A configured absolute directory outside the workspace.
    ExternalDir,
}

impl EvidenceMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "in_repo" => Some(EvidenceMode::InRepo),
            "external_dir" => Some(EvidenceMode::ExternalDir),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceMode::InRepo => "in_repo",
            EvidenceMode::ExternalDir => "external_dir",
        }
    }
}
