//! Side-effecting adapters: filesystem, git, subprocesses, and external CLIs.

pub mod acceptance;
pub mod config;
pub mod executor;
pub mod git;
pub mod manifest;
pub mod process;
pub mod prompt;
pub mod publish;
pub mod review;
pub mod taskpack;
pub mod workspace;
