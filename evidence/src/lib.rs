//! Evidence index and read-only queries over orchestrator run artifacts.

pub mod cli;
pub mod exit_codes;
pub mod index;
pub mod logging;
pub mod query;
pub mod schemas;
