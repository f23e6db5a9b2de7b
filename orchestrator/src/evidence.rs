//! Evidence index for the run's evidence root, written after the run when enabled.

use std::io::Write;

use ::evidence::index::{IndexError, build_index, write_index};
use ::evidence::schemas::{INDEX_FILENAME, INDEX_SCHEMA_VERSION};
use anyhow::{Context, Result};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::io::manifest::ManifestStore;
use crate::run::RunContext;

pub const KEY_INDEX_PATH: &str = "evidence_index_path";
pub const KEY_INDEX_SCHEMA_VERSION: &str = "evidence_index_schema_version";
pub const KEY_INDEX_ERROR: &str = "evidence_index_error";

/// Index `[evidence_root]` into `evidence_root/evidence_index.json`.
///
/// Index failures are recorded in the manifest and never fail the run. Only
/// manifest persistence and progress output errors propagate.
#[instrument(skip_all, fields(enabled = enabled))]
pub fn maybe_collect_evidence_index(
    enabled: bool,
    run: &RunContext,
    manifest: &mut ManifestStore,
    out: &mut dyn Write,
) -> Result<()> {
    if !enabled {
        return Ok(());
    }
    let out_path = run.evidence_root.join(INDEX_FILENAME);
    let built = build_index(std::slice::from_ref(&run.evidence_root), run.evidence_base())
        .and_then(|index| write_index(&index, &out_path));

    match built {
        Ok(()) => {
            info!(path = %out_path.display(), "evidence index written");
            manifest.set(KEY_INDEX_PATH, json!(run.relative_to_base(&out_path)))?;
            manifest.set(KEY_INDEX_SCHEMA_VERSION, json!(INDEX_SCHEMA_VERSION))?;
            manifest.remove(KEY_INDEX_ERROR)?;
            writeln!(out, "[evidence] index written: {}", out_path.display())
                .context("write progress")?;
        }
        Err(err) => {
            let message = describe(&err);
            warn!(err = %message, "evidence index failed");
            manifest.set(KEY_INDEX_ERROR, json!(message))?;
            writeln!(out, "[evidence] index failed: {message}").context("write progress")?;
        }
    }
    Ok(())
}

fn describe(err: &IndexError) -> String {
    format!("{}: {err}", err.kind())
}
