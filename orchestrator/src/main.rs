//! Task pack orchestrator.
//!
//! Reads `TASKPACK_PATH` and the rest of its settings from the environment,
//! runs the task pack against the selected workspace, and opens a pull request.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow};
use clap::Parser;

use orchestrator::exit_codes;
use orchestrator::io::config::{CliOverrides, ENV_TASKPACK_PATH, Settings, process_env};
use orchestrator::io::executor::CommandExecutor;
use orchestrator::io::publish::GhCli;
use orchestrator::io::taskpack::validate_taskpack;
use orchestrator::logging;
use orchestrator::orchestrate::{Services, orchestrate};
use orchestrator::plugin::registry::PluginRegistry;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Run a task pack through the agent phases and open a pull request"
)]
struct Cli {
    /// Run the task pack's solution plugin (also ORCH_ENABLE_PLUGINS).
    #[arg(long)]
    enable_plugins: bool,
    /// Fail the run when the plugin fails (also ORCH_PLUGINS_STRICT).
    #[arg(long)]
    plugins_strict: bool,
    /// Workspace registry name, `playbook`/`self`, or a path.
    #[arg(long, value_name = "NAME|PATH")]
    workspace: Option<String>,
    /// Config file (default: orchestrator.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Validate a task pack directory (default: TASKPACK_PATH) and exit.
    #[arg(long, value_name = "DIR")]
    check_taskpack: Option<Option<PathBuf>>,
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    let result = match cli.check_taskpack.clone() {
        Some(dir) => check_taskpack(dir),
        None => run(cli),
    };
    match result {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(exit_codes::FAILURE as u8)
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let root = std::env::current_dir().context("resolve current directory")?;
    let overrides = CliOverrides {
        enable_plugins: cli.enable_plugins,
        plugins_strict: cli.plugins_strict,
        workspace: cli.workspace,
        config: cli.config,
    };
    let settings = Settings::resolve(&root, &overrides, &process_env)?;
    let agent = CommandExecutor::from_settings(&settings.agent)?;
    let plugins = PluginRegistry::builtin();
    let services = Services {
        agent: &agent,
        pull_requests: &GhCli,
        plugins: &plugins,
    };
    let unix_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock before unix epoch")?
        .as_secs();

    let mut stdout = std::io::stdout().lock();
    orchestrate(&settings, &services, unix_secs, &mut stdout)?;
    Ok(exit_codes::OK)
}

fn check_taskpack(dir: Option<PathBuf>) -> Result<i32> {
    let dir = match dir {
        Some(dir) => dir,
        None => process_env(ENV_TASKPACK_PATH)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("Missing required env var: {ENV_TASKPACK_PATH}"))?,
    };
    let issues = validate_taskpack(Path::new(&dir));
    if issues.is_empty() {
        println!("[taskpack-validator] OK");
        return Ok(exit_codes::OK);
    }
    let mut stderr = std::io::stderr().lock();
    for issue in &issues {
        writeln!(stderr, "[taskpack-validator] FAIL: {issue}").context("write stderr")?;
    }
    Ok(exit_codes::FAILURE)
}
