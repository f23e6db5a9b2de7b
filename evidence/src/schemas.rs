//! Stable file names and schema versions shared by evidence producers and readers.

/// Per-run manifest written by the orchestrator. Its presence defines a run directory.
pub const MANIFEST_FILENAME: &str = "manifest.json";
/// Advisory review report collected into a run directory.
pub const REVIEW_REPORT_FILENAME: &str = "review_report.json";
/// Derived cross-run index. Never listed as an artifact.
pub const INDEX_FILENAME: &str = "evidence_index.json";
/// Version of the `evidence_index.json` layout.
pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Evidence root used when evidence lives inside the workspace.
pub const DEFAULT_EVIDENCE_DIR: &str = ".orchestrator_logs";
/// Default index location, relative to the repository root.
pub const DEFAULT_INDEX_PATH: &str = ".orchestrator_logs/evidence_index.json";
