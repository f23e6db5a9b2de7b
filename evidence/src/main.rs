use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use evidence::cli::{Query, index_command, query_command};
use evidence::exit_codes;
use evidence::logging;
use evidence::schemas::DEFAULT_INDEX_PATH;

#[derive(Parser)]
#[command(name = "evidence", version, about = "Build and query the orchestrator evidence index")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build evidence index JSON.
    Index {
        /// Root directory to scan (default: .orchestrator_logs). Can be repeated.
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
        /// Output JSON path.
        #[arg(long, default_value = DEFAULT_INDEX_PATH)]
        out: PathBuf,
    },
    /// List runs from index.
    ListRuns {
        #[arg(long, default_value = DEFAULT_INDEX_PATH)]
        index: PathBuf,
    },
    /// List artifacts for a run from index.
    ListArtifacts {
        #[arg(long, default_value = DEFAULT_INDEX_PATH)]
        index: PathBuf,
        #[arg(long)]
        run_id: String,
    },
    /// Show a single artifact path for a run and type.
    ShowArtifact {
        #[arg(long, default_value = DEFAULT_INDEX_PATH)]
        index: PathBuf,
        #[arg(long)]
        run_id: String,
        #[arg(long = "type")]
        artifact_type: String,
    },
    /// Show index metadata.
    ShowIndexMeta {
        #[arg(long, default_value = DEFAULT_INDEX_PATH)]
        index: PathBuf,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();
    let repo_root = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(exit_codes::INTERNAL as u8);
        }
    };

    let (index, query) = match cli.command {
        Command::Index { roots, out } => {
            return match index_command(&repo_root, &roots, &out) {
                Ok(()) => ExitCode::from(exit_codes::OK as u8),
                Err(err) => {
                    eprintln!("error: {err:#}");
                    ExitCode::from(exit_codes::INTERNAL as u8)
                }
            };
        }
        Command::ListRuns { index } => (index, Query::ListRuns),
        Command::ListArtifacts { index, run_id } => (index, Query::ListArtifacts { run_id }),
        Command::ShowArtifact {
            index,
            run_id,
            artifact_type,
        } => (
            index,
            Query::ShowArtifact {
                run_id,
                artifact_type,
            },
        ),
        Command::ShowIndexMeta { index } => (index, Query::ShowIndexMeta),
    };

    match query_command(&repo_root, &index, &query) {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::from(exit_codes::OK as u8)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(exit_codes::LOOKUP as u8)
        }
    }
}
