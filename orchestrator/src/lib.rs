//! Task pack orchestration engine.
//!
//! One invocation takes a task pack (spec, acceptance criteria, risk notes and
//! a `task.yml` descriptor) through a fixed sequence of agent phases against a
//! target workspace, then verifies, records evidence and opens a pull request.
//!
//! - **[`core`]**: Pure, deterministic logic (phase order, naming, path scope).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, git, subprocesses).
//!   Collaborators that leave the machine sit behind traits.
//!
//! Orchestration modules ([`orchestrate`], [`phases`], [`plugin`], [`enforce`],
//! [`evidence`]) coordinate core logic with I/O; [`run::RunContext`] carries the
//! per-run paths through all of them.

pub mod core;
pub mod enforce;
pub mod evidence;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrate;
pub mod phases;
pub mod plugin;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
