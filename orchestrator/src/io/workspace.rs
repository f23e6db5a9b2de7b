//! Workspace registry and resolution.
//!
//! A workspace is the repository a task pack is applied to. It is named in a
//! YAML registry, given as a filesystem path, or aliased to the orchestrator's
//! own repository (`playbook` / `self`). The workspace also decides where run
//! evidence lives.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::types::EvidenceMode;

pub use evidence::schemas::DEFAULT_EVIDENCE_DIR;

/// Only supported workspace kind.
pub const KIND_LOCAL_PATH: &str = "local_path";
/// Aliases that resolve to the orchestrator's own repository.
pub const SELF_ALIASES: [&str; 2] = ["playbook", "self"];

const MISSING_WORKSPACE: &str = "No workspace specified. Provide --workspace <name|path> or \
workspace: in task.yml (or workspace: playbook for self).";

/// Registry and resolution failures. All are configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Failed to parse registry: {} ({message})", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("{0}")]
    Invalid(String),
    #[error("{}", MISSING_WORKSPACE)]
    Missing,
    #[error("{label} does not exist: {}", .path.display())]
    PathMissing { label: String, path: PathBuf },
    #[error(
        "evidence root {} is inside the orchestrator repository {}; use external_dir evidence for foreign workspaces",
        .evidence_root.display(),
        .orchestrator_root.display()
    )]
    EvidenceNotIsolated {
        evidence_root: PathBuf,
        orchestrator_root: PathBuf,
    },
}

fn invalid(message: impl Into<String>) -> RegistryError {
    RegistryError::Invalid(message.into())
}

/// Registry-wide defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDefaults {
    pub kind: String,
    pub evidence_mode: EvidenceMode,
    pub evidence_dir: Option<PathBuf>,
    pub acceptance: Vec<String>,
}

impl Default for RegistryDefaults {
    fn default() -> Self {
        Self {
            kind: KIND_LOCAL_PATH.to_string(),
            evidence_mode: EvidenceMode::InRepo,
            evidence_dir: None,
            acceptance: Vec::new(),
        }
    }
}

/// One validated registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub kind: String,
    pub path: PathBuf,
    pub evidence_mode: EvidenceMode,
    pub evidence_dir: Option<PathBuf>,
    pub acceptance: Vec<String>,
}

/// A registry that passed load-time validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRegistry {
    pub version: i64,
    pub defaults: RegistryDefaults,
    pub workspaces: BTreeMap<String, RegistryEntry>,
}

/// A resolved workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Registry name or alias; `None` when addressed by path.
    pub name: Option<String>,
    /// Absolute workspace root.
    pub root: PathBuf,
    pub kind: String,
    pub evidence_mode: EvidenceMode,
    /// Set iff `evidence_mode` is `external_dir`; absolute.
    pub evidence_dir: Option<PathBuf>,
    /// Acceptance override used when the task pack declares no tests.
    pub acceptance: Vec<String>,
}

/// First non-empty of CLI, environment and `task.yml` values.
pub fn select_workspace_spec(
    cli: Option<&str>,
    env: Option<&str>,
    task: Option<&str>,
) -> Option<String> {
    [cli, env, task]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Load and strictly validate a workspace registry.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_workspace_registry(path: &Path) -> Result<WorkspaceRegistry, RegistryError> {
    let parse_error = |message: String| RegistryError::Parse {
        path: path.to_path_buf(),
        message,
    };
    let contents = fs::read_to_string(path).map_err(|err| parse_error(err.to_string()))?;
    let raw: Value = serde_yaml::from_str(&contents).map_err(|err| parse_error(err.to_string()))?;
    let empty = Value::Mapping(Mapping::new());
    let data = require_mapping(if raw.is_null() { &empty } else { &raw }, "registry")?;

    let version = data
        .get("version")
        .and_then(Value::as_i64)
        .ok_or_else(|| invalid("registry.version must be an integer"))?;

    let defaults = require_mapping(
        data.get("defaults").unwrap_or(&empty),
        "registry.defaults",
    )?;
    let defaults_kind = require_str(defaults.get("kind"), "registry.defaults.kind")?;
    let defaults_mode = parse_mode(
        require_str(defaults.get("evidence_mode"), "registry.defaults.evidence_mode")?,
        "registry.defaults.evidence_mode",
    )?;
    let defaults_evidence_dir = optional_absolute(
        defaults.get("evidence_dir"),
        "registry.defaults.evidence_dir",
    )?;
    let defaults_acceptance =
        require_string_list(defaults.get("acceptance"), "registry.defaults.acceptance")?;

    let mut workspaces = BTreeMap::new();
    let entries = require_mapping(
        data.get("workspaces").unwrap_or(&empty),
        "registry.workspaces",
    )?;
    for (name, entry) in entries {
        let name = name
            .as_str()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| invalid("workspace names must be non-empty strings"))?;
        let label = format!("workspace.{name}");
        let entry = require_mapping(entry, &label)?;

        let kind = match entry.get("kind") {
            None => defaults_kind.clone(),
            Some(value) => value.as_str().unwrap_or_default().to_string(),
        };
        if kind != KIND_LOCAL_PATH {
            return Err(invalid(format!("{label}.kind must be local_path")));
        }

        let path = PathBuf::from(require_str(entry.get("path"), &format!("{label}.path"))?);
        if !path.is_absolute() {
            return Err(invalid(format!("{label}.path must be absolute")));
        }

        let evidence_mode = match entry.get("evidence_mode") {
            None => defaults_mode,
            Some(value) => parse_mode(
                value.as_str().unwrap_or_default().to_string(),
                &format!("{label}.evidence_mode"),
            )?,
        };
        let evidence_dir = match evidence_mode {
            EvidenceMode::ExternalDir => {
                let dir = PathBuf::from(require_str(
                    entry.get("evidence_dir"),
                    &format!("{label}.evidence_dir"),
                )?);
                if !dir.is_absolute() {
                    return Err(invalid(format!("{label}.evidence_dir must be absolute")));
                }
                Some(dir)
            }
            EvidenceMode::InRepo => None,
        };

        let acceptance = match entry.get("acceptance") {
            None => defaults_acceptance.clone(),
            Some(value) => require_string_list(Some(value), &format!("{label}.acceptance"))?,
        };

        workspaces.insert(
            name.to_string(),
            RegistryEntry {
                kind,
                path,
                evidence_mode,
                evidence_dir,
                acceptance,
            },
        );
    }

    debug!(version, workspaces = workspaces.len(), "workspace registry loaded");
    Ok(WorkspaceRegistry {
        version,
        defaults: RegistryDefaults {
            kind: defaults_kind,
            evidence_mode: defaults_mode,
            evidence_dir: defaults_evidence_dir,
            acceptance: defaults_acceptance,
        },
        workspaces,
    })
}

/// Resolve a workspace specifier.
///
/// The registry is optional: when `registry_path` does not exist only aliases and
/// paths resolve, using built-in defaults.
#[instrument(skip_all, fields(spec = ?spec))]
pub fn resolve_workspace(
    spec: Option<&str>,
    registry_path: &Path,
    default_root: &Path,
) -> Result<WorkspaceConfig, RegistryError> {
    let registry = if registry_path.exists() {
        Some(load_workspace_registry(registry_path)?)
    } else {
        None
    };
    let defaults = registry
        .as_ref()
        .map(|r| r.defaults.clone())
        .unwrap_or_default();

    let spec = spec
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(RegistryError::Missing)?;

    if SELF_ALIASES.contains(&spec) {
        let evidence_dir = external_dir_for(&defaults, "workspace default evidence_dir")?;
        return Ok(WorkspaceConfig {
            name: Some(spec.to_string()),
            root: resolve_path(default_root),
            kind: KIND_LOCAL_PATH.to_string(),
            evidence_mode: defaults.evidence_mode,
            evidence_dir,
            acceptance: defaults.acceptance,
        });
    }

    if let Some(entry) = registry.as_ref().and_then(|r| r.workspaces.get(spec)) {
        let root = resolve_path(&entry.path);
        if !root.exists() {
            return Err(RegistryError::PathMissing {
                label: format!("workspace.{spec}.path"),
                path: root,
            });
        }
        return Ok(WorkspaceConfig {
            name: Some(spec.to_string()),
            root,
            kind: entry.kind.clone(),
            evidence_mode: entry.evidence_mode,
            evidence_dir: entry.evidence_dir.as_deref().map(resolve_path),
            acceptance: entry.acceptance.clone(),
        });
    }

    let root = resolve_path(Path::new(spec));
    if !root.exists() {
        return Err(RegistryError::PathMissing {
            label: "workspace path".to_string(),
            path: root,
        });
    }
    let evidence_dir = external_dir_for(&defaults, "workspace default evidence_dir")?;
    Ok(WorkspaceConfig {
        name: None,
        root,
        kind: defaults.kind,
        evidence_mode: defaults.evidence_mode,
        evidence_dir,
        acceptance: defaults.acceptance,
    })
}

/// `(evidence_root, run_dir)` for a run of `workspace`.
pub fn evidence_paths(
    workspace: &WorkspaceConfig,
    run_id: &str,
) -> Result<(PathBuf, PathBuf), RegistryError> {
    let evidence_root = match workspace.evidence_mode {
        EvidenceMode::InRepo => workspace.root.join(DEFAULT_EVIDENCE_DIR),
        EvidenceMode::ExternalDir => workspace.evidence_dir.clone().ok_or_else(|| {
            invalid("Evidence directory required for external_dir mode.")
        })?,
    };
    let evidence_root = resolve_path(&evidence_root);
    let run_dir = evidence_root.join(run_id);
    Ok((evidence_root, run_dir))
}

/// True when the workspace is the orchestrator's own repository.
pub fn is_self_workspace(workspace: &WorkspaceConfig, orchestrator_root: &Path) -> bool {
    resolve_path(&workspace.root) == resolve_path(orchestrator_root)
}

/// Reject evidence roots inside the orchestrator repository for foreign workspaces.
pub fn ensure_evidence_isolated(
    workspace: &WorkspaceConfig,
    evidence_root: &Path,
    orchestrator_root: &Path,
) -> Result<(), RegistryError> {
    if is_self_workspace(workspace, orchestrator_root) {
        return Ok(());
    }
    let evidence_root = resolve_path(evidence_root);
    let orchestrator_root = resolve_path(orchestrator_root);
    // A workspace nested inside the orchestrator repo may keep in-repo evidence.
    if evidence_root.starts_with(&orchestrator_root)
        && !evidence_root.starts_with(resolve_path(&workspace.root))
    {
        return Err(RegistryError::EvidenceNotIsolated {
            evidence_root,
            orchestrator_root,
        });
    }
    Ok(())
}

fn external_dir_for(
    defaults: &RegistryDefaults,
    label: &str,
) -> Result<Option<PathBuf>, RegistryError> {
    match defaults.evidence_mode {
        EvidenceMode::InRepo => Ok(None),
        EvidenceMode::ExternalDir => defaults
            .evidence_dir
            .as_deref()
            .map(resolve_path)
            .map(Some)
            .ok_or_else(|| invalid(format!("{label} required for external_dir mode"))),
    }
}

/// Canonicalize when possible so comparisons see through symlinks.
fn resolve_path(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn require_mapping<'a>(value: &'a Value, label: &str) -> Result<&'a Mapping, RegistryError> {
    value
        .as_mapping()
        .ok_or_else(|| invalid(format!("{label} must be a mapping")))
}

fn require_str(value: Option<&Value>, label: &str) -> Result<String, RegistryError> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| invalid(format!("{label} must be a non-empty string")))
}

fn require_string_list(value: Option<&Value>, label: &str) -> Result<Vec<String>, RegistryError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }
    let error = || invalid(format!("{label} must be a list of strings"));
    value
        .as_sequence()
        .ok_or_else(error)?
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(error))
        .collect()
}

fn optional_absolute(value: Option<&Value>, label: &str) -> Result<Option<PathBuf>, RegistryError> {
    match value {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => {
            let path = PathBuf::from(require_str(Some(value), label)?);
            if !path.is_absolute() {
                return Err(invalid(format!("{label} must be absolute")));
            }
            Ok(Some(path))
        }
    }
}

fn parse_mode(value: String, label: &str) -> Result<EvidenceMode, RegistryError> {
    EvidenceMode::parse(&value)
        .ok_or_else(|| invalid(format!("{label} must be in_repo or external_dir")))
}
