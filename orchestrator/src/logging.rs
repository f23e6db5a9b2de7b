//! Diagnostics tracing for the orchestrator.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: Diagnostics via `RUST_LOG`, output to stderr.
//!   Not persisted, not part of run evidence.
//!
//! - **Run evidence (`io/manifest`, agent and acceptance logs)**: Product
//!   artifacts under the run's log dir. Always written, unaffected by `RUST_LOG`.
//!
//! Operator progress lines (`[skip] ...`, `[plugin] ...`) go to stdout.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `info` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=orchestrator=debug TASKPACK_PATH=taskpacks/T-1 cargo run -p orchestrator
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
