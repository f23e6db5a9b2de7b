//! Test-only fixtures: scratch git repositories, task packs and scripted
//! collaborators for the agent, the PR CLI and plugins.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::io::executor::{AgentExecutor, AgentRequest, AgentRun, write_agent_log};
use crate::io::publish::{PullRequestRequest, PullRequests};
use crate::io::taskpack::{ACCEPTANCE_FILE, RISK_FILE, SPEC_FILE, TASK_FILE, TaskPack};
use crate::plugin::interface::{
    ExecutionContext, Plan, PluginCapabilities, RawOutput, SolutionPlugin, ValidationReport,
};

/// A throwaway git repository on `main` with one initial commit.
///
/// Run logs under `.orchestrator_logs/` are git-ignored, as in real workspaces.
pub struct TestRepo {
    temp: TempDir,
    root: PathBuf,
}

impl TestRepo {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("repo");
        fs::create_dir_all(&root).expect("create repo dir");
        git(&root, &["init", "-q"]);
        git(&root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&root, &["config", "user.email", "tests@example.com"]);
        git(&root, &["config", "user.name", "Tests"]);
        git(&root, &["config", "commit.gpgsign", "false"]);
        fs::write(root.join("README.md"), "# test repo\n").expect("write README");
        fs::write(root.join(".gitignore"), ".orchestrator_logs/\n").expect("write .gitignore");
        git(&root, &["add", "-A"]);
        git(&root, &["commit", "-q", "-m", "initial"]);
        Self { temp, root }
    }

    /// Like [`TestRepo::new`], with a bare `origin` to push to.
    pub fn with_origin() -> Self {
        let repo = Self::new();
        let origin = repo.origin_dir();
        fs::create_dir_all(&origin).expect("create origin dir");
        git(&origin, &["init", "-q", "--bare"]);
        let url = origin.to_string_lossy().to_string();
        git(&repo.root, &["remote", "add", "origin", &url]);
        repo
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// A directory beside the repository, never tracked by it.
    pub fn scratch(&self) -> PathBuf {
        let dir = self.temp.path().join("scratch");
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    /// SHA of `branch` in the bare origin.
    pub fn origin_rev(&self, branch: &str) -> String {
        let out = git(&self.origin_dir(), &["rev-parse", &format!("refs/heads/{branch}")]);
        out.trim().to_string()
    }

    /// Subjects of the last `n` commits on HEAD, newest first.
    pub fn log_subjects(&self, n: usize) -> Vec<String> {
        git(&self.root, &["log", &format!("-{n}"), "--format=%s"])
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn origin_dir(&self) -> PathBuf {
        self.temp.path().join("origin.git")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Contents of the four task pack files.
#[derive(Debug, Clone)]
pub struct TaskPackBuilder {
    task_yml: String,
    acceptance_yml: String,
    spec_md: String,
    risk_md: String,
}

impl Default for TaskPackBuilder {
    fn default() -> Self {
        Self {
            task_yml: "id: TASK-1\n\
                       title: First task\n\
                       constraints:\n  allow_network: false\n  allow_cloud_mutations: false\n"
                .to_string(),
            acceptance_yml: "format:\n  commands: []\nlint:\n  commands: []\ntests:\n  commands: []\n"
                .to_string(),
            spec_md: "# Spec\n\nDo the first task.\n".to_string(),
            risk_md: "# Risk\n\nLow.\n".to_string(),
        }
    }
}

impl TaskPackBuilder {
    pub fn task_yml(mut self, contents: &str) -> Self {
        self.task_yml = contents.to_string();
        self
    }

    pub fn acceptance_yml(mut self, contents: &str) -> Self {
        self.acceptance_yml = contents.to_string();
        self
    }
}

/// Write the builder's files into `dir`, creating it.
pub fn write_taskpack(dir: &Path, builder: &TaskPackBuilder) {
    fs::create_dir_all(dir).expect("create task pack dir");
    for (name, contents) in [
        (TASK_FILE, &builder.task_yml),
        (ACCEPTANCE_FILE, &builder.acceptance_yml),
        (SPEC_FILE, &builder.spec_md),
        (RISK_FILE, &builder.risk_md),
    ] {
        fs::write(dir.join(name), contents).expect("write task pack file");
    }
}

/// Agent that returns scripted exit codes, one per invocation.
///
/// Running out of script is an invocation error.
pub struct ScriptedAgent {
    exit_codes: RefCell<VecDeque<i32>>,
    writes: Vec<(usize, String, String)>,
    requests: RefCell<Vec<AgentRequest>>,
}

impl ScriptedAgent {
    pub fn new(exit_codes: Vec<i32>) -> Self {
        Self {
            exit_codes: RefCell::new(exit_codes.into()),
            writes: Vec::new(),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// On the `call`-th invocation (0-based), write `file` into the workdir.
    pub fn writing_on_call(mut self, call: usize, file: &str, contents: &str) -> Self {
        self.writes
            .push((call, file.to_string(), contents.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.borrow().clone()
    }
}

impl AgentExecutor for ScriptedAgent {
    fn invoke(&self, request: &AgentRequest) -> Result<AgentRun> {
        let call = self.requests.borrow().len();
        self.requests.borrow_mut().push(request.clone());
        let code = self
            .exit_codes
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted agent has no exit code for call {call}"))?;
        for (_, file, contents) in self.writes.iter().filter(|(at, _, _)| *at == call) {
            fs::write(request.workdir.join(file), contents)?;
        }
        write_agent_log(&request.log_path, &format!("scripted call {call}: exit {code}\n"))?;
        Ok(AgentRun {
            exit_code: Some(code),
            timed_out: false,
        })
    }
}

/// In-memory PR backend.
#[derive(Default)]
pub struct FakePullRequests {
    exists: bool,
    created: RefCell<Vec<PullRequestRequest>>,
}

impl FakePullRequests {
    /// A backend that already has a PR for every head.
    pub fn existing() -> Self {
        Self {
            exists: true,
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<PullRequestRequest> {
        self.created.borrow().clone()
    }
}

impl PullRequests for FakePullRequests {
    fn exists_for_head(&self, _workdir: &Path, _head: &str) -> Result<bool> {
        Ok(self.exists)
    }

    fn create(&self, request: &PullRequestRequest) -> Result<String> {
        let mut created = self.created.borrow_mut();
        created.push(request.clone());
        Ok(format!("https://example.test/pull/{}", created.len()))
    }
}

/// Plugin that records which protocol methods were called.
///
/// Clones share the call log, so a clone handed to a registry reports back.
#[derive(Clone)]
pub struct SpyPlugin {
    id: String,
    version: String,
    capabilities: PluginCapabilities,
    validation: ValidationReport,
    calls: Rc<RefCell<Vec<&'static str>>>,
}

impl Default for SpyPlugin {
    fn default() -> Self {
        Self {
            id: "test/spy".to_string(),
            version: "0.0.1".to_string(),
            capabilities: PluginCapabilities::default(),
            validation: ValidationReport::ok(),
            calls: Rc::default(),
        }
    }
}

impl SpyPlugin {
    pub fn with_identity(mut self, id: &str, version: &str) -> Self {
        self.id = id.to_string();
        self.version = version.to_string();
        self
    }

    pub fn with_capabilities(mut self, capabilities: PluginCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_validation(mut self, validation: ValidationReport) -> Self {
        self.validation = validation;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }
}

impl SolutionPlugin for SpyPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn capabilities(&self) -> PluginCapabilities {
        self.record("capabilities");
        self.capabilities
    }

    fn validate(&self, _taskpack: &TaskPack, _ctx: &ExecutionContext) -> Result<ValidationReport> {
        self.record("validate");
        Ok(self.validation.clone())
    }

    fn plan(&self, _taskpack: &TaskPack, _ctx: &ExecutionContext) -> Result<Plan> {
        self.record("plan");
        Ok(Plan::default())
    }

    fn run(&self, _plan: &Plan, _ctx: &ExecutionContext) -> Result<RawOutput> {
        self.record("run");
        Ok(RawOutput::default())
    }

    fn report(&self, _raw: &RawOutput, _ctx: &ExecutionContext) -> Result<Vec<PathBuf>> {
        self.record("report");
        Ok(Vec::new())
    }
}
