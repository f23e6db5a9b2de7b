//! Task pack loading and validation.
//!
//! A task pack is a directory with four required files: `task.yml` (descriptor),
//! `spec.md`, `risk.md` and `acceptance.yml`. It is loaded once per run and
//! never mutated afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value as YamlValue;
use tracing::debug;

pub const TASK_FILE: &str = "task.yml";
pub const SPEC_FILE: &str = "spec.md";
pub const RISK_FILE: &str = "risk.md";
pub const ACCEPTANCE_FILE: &str = "acceptance.yml";
/// Written by the `pr_author` phase; used as the PR body when present.
pub const PR_BODY_FILE: &str = "pr_body.md";

const REQUIRED_FILES: [&str; 4] = [TASK_FILE, SPEC_FILE, RISK_FILE, ACCEPTANCE_FILE];
const REQUIRED_TASK_KEYS: [&str; 3] = ["id", "title", "constraints"];
const REQUIRED_CONSTRAINT_KEYS: [&str; 2] = ["allow_network", "allow_cloud_mutations"];

/// Capability gates declared by the task pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Constraints {
    pub allow_network: bool,
    pub allow_cloud_mutations: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct SkillsSection {
    prefer: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct DocsSection {
    required: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct ScopeSection {
    allowed_paths: Vec<String>,
}

/// Raw `task.yml` shape. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TaskFile {
    #[serde(deserialize_with = "scalar_text")]
    id: Option<String>,
    #[serde(deserialize_with = "scalar_text")]
    title: Option<String>,
    constraints: Option<Constraints>,
    skills: Option<SkillsSection>,
    docs: Option<DocsSection>,
    scope: Option<ScopeSection>,
    plugin: Option<String>,
    workspace: Option<String>,
}

/// One acceptance group (`format`, `lint` or `tests`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandGroup {
    pub commands: Vec<String>,
}

/// Parsed `acceptance.yml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Acceptance {
    pub format: CommandGroup,
    pub lint: CommandGroup,
    pub tests: CommandGroup,
}

/// A loaded task pack.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPack {
    pub path: PathBuf,
    pub id: String,
    pub title: String,
    pub constraints: Constraints,
    pub preferred_skills: Vec<String>,
    pub docs_required: Vec<String>,
    pub allowed_paths: Vec<String>,
    pub plugin: Option<String>,
    pub workspace: Option<String>,
    pub acceptance: Acceptance,
    pub spec: String,
    pub risk: String,
    /// Full `task.yml` document, handed to plugins as-is.
    pub descriptor: YamlValue,
}

impl TaskPack {
    /// Load a task pack, failing on the first missing required file.
    pub fn load(path: &Path) -> Result<Self> {
        for name in REQUIRED_FILES {
            let file = path.join(name);
            if !file.is_file() {
                bail!("Task pack missing required file: {}", file.display());
            }
        }

        let task_path = path.join(TASK_FILE);
        let descriptor = read_yaml(&task_path)?;
        let task: TaskFile = serde_yaml::from_value(descriptor.clone())
            .with_context(|| format!("parse {}", task_path.display()))?;
        let acceptance_path = path.join(ACCEPTANCE_FILE);
        let acceptance: Acceptance = serde_yaml::from_value(read_yaml(&acceptance_path)?)
            .with_context(|| format!("parse {}", acceptance_path.display()))?;
        let spec = read_text(&path.join(SPEC_FILE))?;
        let risk = read_text(&path.join(RISK_FILE))?;

        let pack = Self {
            path: path.to_path_buf(),
            id: non_blank(task.id).unwrap_or_else(|| "TASK-UNKNOWN".to_string()),
            title: non_blank(task.title).unwrap_or_else(|| "Untitled".to_string()),
            constraints: task.constraints.unwrap_or_default(),
            preferred_skills: task.skills.unwrap_or_default().prefer,
            docs_required: task.docs.unwrap_or_default().required,
            allowed_paths: task.scope.unwrap_or_default().allowed_paths,
            plugin: non_blank(task.plugin),
            workspace: non_blank(task.workspace),
            acceptance,
            spec,
            risk,
            descriptor,
        };
        debug!(id = %pack.id, path = %path.display(), "task pack loaded");
        Ok(pack)
    }

    /// Path where the `pr_author` phase writes the PR body.
    pub fn pr_body_path(&self) -> PathBuf {
        self.path.join(PR_BODY_FILE)
    }
}

/// Check a task pack directory and return every issue found (empty when valid).
///
/// Checks the four required files, `task.yml` keys `id`, `title`, `constraints`,
/// and the two constraint flags.
pub fn validate_taskpack(path: &Path) -> Vec<String> {
    let mut issues = Vec::new();
    for name in REQUIRED_FILES {
        let file = path.join(name);
        if !file.is_file() {
            issues.push(format!("Missing required file: {}", file.display()));
        }
    }

    let task_path = path.join(TASK_FILE);
    if task_path.is_file() {
        match read_yaml(&task_path) {
            Ok(YamlValue::Mapping(task)) => {
                for key in REQUIRED_TASK_KEYS {
                    if !task.contains_key(key) {
                        issues.push(format!("task.yml missing required key: {key}"));
                    }
                }
                if let Some(constraints) = task.get("constraints") {
                    match constraints.as_mapping() {
                        Some(constraints) => {
                            for key in REQUIRED_CONSTRAINT_KEYS {
                                if !constraints.contains_key(key) {
                                    issues.push(format!(
                                        "task.yml.constraints missing required key: {key}"
                                    ));
                                }
                            }
                        }
                        None => issues.push("task.yml.constraints must be a mapping".to_string()),
                    }
                }
            }
            Ok(_) => issues.push("task.yml must be a mapping".to_string()),
            Err(err) => issues.push(format!("{err:#}")),
        }
    }

    let acceptance_path = path.join(ACCEPTANCE_FILE);
    if acceptance_path.is_file()
        && let Err(err) = read_yaml(&acceptance_path)
            .and_then(|value| serde_yaml::from_value::<Acceptance>(value).map_err(Into::into))
    {
        issues.push(format!(
            "Failed to parse YAML: {} ({err:#})",
            acceptance_path.display()
        ));
    }
    issues
}

/// Parse a YAML file; an empty document is treated as an empty mapping.
fn read_yaml(path: &Path) -> Result<YamlValue> {
    let contents = read_text(path)?;
    let value: YamlValue = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse YAML: {}", path.display()))?;
    if value.is_null() {
        return Ok(YamlValue::Mapping(Default::default()));
    }
    Ok(value)
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
}

/// Accept any YAML scalar as text, so `id: 1201` reads as `"1201"`.
fn scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<YamlValue>::deserialize(deserializer)? {
        None | Some(YamlValue::Null) => Ok(None),
        Some(YamlValue::String(s)) => Ok(Some(s)),
        Some(YamlValue::Number(n)) => Ok(Some(n.to_string())),
        Some(YamlValue::Bool(b)) => Ok(Some(if b { "True" } else { "False" }.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a scalar, found {other:?}"
        ))),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TaskPackBuilder, write_taskpack};

    #[test]
    fn load_reads_descriptor_and_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tp");
        write_taskpack(&dir, &TaskPackBuilder::default().task_yml("constraints: {}\n"));

        let pack = TaskPack::load(&dir).expect("load");

        assert_eq!(pack.id, "TASK-UNKNOWN");
        assert_eq!(pack.title, "Untitled");
        assert_eq!(pack.constraints, Constraints::default());
        assert!(pack.preferred_skills.is_empty());
        assert!(pack.plugin.is_none());
        assert!(pack.acceptance.tests.commands.is_empty());
    }

    #[test]
    fn load_reads_every_section() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tp");
        let builder = TaskPackBuilder::default()
            .task_yml(
                "id: TASK-9\n\
                 title: Nine\n\
                 constraints:\n  allow_network: true\n  allow_cloud_mutations: false\n\
                 skills:\n  prefer: [rust, git]\n\
                 docs:\n  required: [docs/A.md]\n\
                 scope:\n  allowed_paths: [src/]\n\
                 plugin: solutions.security.echo.plugin:EchoPlugin\n\
                 workspace: playbook\n",
            )
            .acceptance_yml("format:\n  commands: [\"true\"]\ntests:\n  commands: [\"echo ok\"]\n");
        write_taskpack(&dir, &builder);

        let pack = TaskPack::load(&dir).expect("load");

        assert_eq!(pack.id, "TASK-9");
        assert!(pack.constraints.allow_network);
        assert_eq!(pack.preferred_skills, vec!["rust", "git"]);
        assert_eq!(pack.docs_required, vec!["docs/A.md"]);
        assert_eq!(pack.allowed_paths, vec!["src/"]);
        assert_eq!(pack.workspace.as_deref(), Some("playbook"));
        assert_eq!(pack.acceptance.format.commands, vec!["true"]);
        assert!(pack.acceptance.lint.commands.is_empty());
        assert_eq!(pack.acceptance.tests.commands, vec!["echo ok"]);
    }

    #[test]
    fn load_reads_numeric_id_and_title_as_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tp");
        write_taskpack(
            &dir,
            &TaskPackBuilder::default().task_yml(
                "id: 1201\ntitle: 2024\nconstraints:\n  allow_network: false\n  allow_cloud_mutations: false\n",
            ),
        );

        let pack = TaskPack::load(&dir).expect("load");

        assert_eq!(pack.id, "1201");
        assert_eq!(pack.title, "2024");
    }

    #[test]
    fn load_rejects_non_scalar_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tp");
        write_taskpack(
            &dir,
            &TaskPackBuilder::default().task_yml("id: [1, 2]\ntitle: T\nconstraints: {}\n"),
        );

        let err = TaskPack::load(&dir).unwrap_err();

        assert!(format!("{err:#}").contains("expected a scalar"), "{err:#}");
    }

    #[test]
    fn load_names_the_missing_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tp");
        write_taskpack(&dir, &TaskPackBuilder::default());
        fs::remove_file(dir.join(RISK_FILE)).expect("remove");

        let err = TaskPack::load(&dir).unwrap_err();

        assert!(err.to_string().contains("Task pack missing required file"));
        assert!(err.to_string().contains("risk.md"));
    }

    #[test]
    fn validate_reports_every_issue() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tp");
        write_taskpack(
            &dir,
            &TaskPackBuilder::default().task_yml("id: T-1\nconstraints:\n  allow_network: false\n"),
        );
        fs::remove_file(dir.join(SPEC_FILE)).expect("remove");

        let issues = validate_taskpack(&dir);

        assert_eq!(issues.len(), 3, "{issues:?}");
        assert!(issues[0].starts_with("Missing required file"));
        assert_eq!(issues[1], "task.yml missing required key: title");
        assert_eq!(
            issues[2],
            "task.yml.constraints missing required key: allow_cloud_mutations"
        );
    }

    #[test]
    fn validate_accepts_complete_pack() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("tp");
        write_taskpack(&dir, &TaskPackBuilder::default());

        assert!(validate_taskpack(&dir).is_empty());
    }
}
