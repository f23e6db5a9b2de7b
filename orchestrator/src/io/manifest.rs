//! Per-run manifest (`<log_dir>/manifest.json`).
//!
//! The manifest is a single JSON object whose keys accumulate over the run. It
//! is rewritten whole after every mutation so a crash at any point leaves the
//! last complete state on disk.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// In-memory manifest that persists itself after every change.
#[derive(Debug)]
pub struct ManifestStore {
    path: PathBuf,
    data: Map<String, Value>,
}

impl ManifestStore {
    /// Open the manifest at `path`, creating `{"result": "started"}` when absent.
    ///
    /// An existing manifest that cannot be read as a JSON object is replaced by
    /// `{"result": "started", "warning": "manifest_unreadable"}`.
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            match load_manifest(path) {
                Ok(data) => data,
                Err(err) => {
                    warn!(path = %path.display(), err = %format!("{err:#}"), "manifest unreadable, replacing");
                    object(json!({"result": "started", "warning": "manifest_unreadable"}))
                }
            }
        } else {
            object(json!({"result": "started"}))
        };
        let store = Self {
            path: path.to_path_buf(),
            data,
        };
        store.persist()?;
        Ok(store)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Insert or replace `key`, then persist.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.data.insert(key.to_string(), value);
        self.persist()
    }

    /// Remove `key` if present, then persist.
    pub fn remove(&mut self, key: &str) -> Result<()> {
        self.data.shift_remove(key);
        self.persist()
    }

    /// Record `phases.<phase> = {status, attempts}`.
    pub fn set_phase(&mut self, phase: &str, status: &str, attempts: u32) -> Result<()> {
        let phases = self
            .data
            .entry("phases")
            .or_insert_with(|| Value::Object(Map::new()));
        if !phases.is_object() {
            *phases = Value::Object(Map::new());
        }
        if let Value::Object(phases) = phases {
            phases.insert(
                phase.to_string(),
                json!({"status": status, "attempts": attempts}),
            );
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        write_manifest(&self.path, &self.data)
    }
}

/// Load a manifest, requiring a top-level JSON object.
pub fn load_manifest(path: &Path) -> Result<Map<String, Value>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read manifest {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse manifest {}", path.display()))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("manifest {} is not a JSON object", path.display()),
    }
}

/// Atomically write the manifest (pretty JSON, trailing newline, insertion order kept).
pub fn write_manifest(path: &Path, data: &Map<String, Value>) -> Result<()> {
    debug!(path = %path.display(), keys = data.len(), "writing manifest");
    let mut buf = serde_json::to_string_pretty(data)?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` to a sibling temp file and rename it over `path`.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
