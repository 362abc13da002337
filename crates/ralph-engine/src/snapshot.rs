//! Persisted session snapshots
//!
//! Written atomically (temp file + rename) on every IterationFinished so a
//! crash never leaves a torn snapshot. `resume` reads the latest snapshot
//! back.

use std::path::{Path, PathBuf};

use tokio::fs;

use ralph_core::{Error, Result, SessionSnapshot};

/// Well-known snapshot location for a working directory.
pub fn snapshot_path(cwd: &Path) -> PathBuf {
    cwd.join(".ralph").join("session.json")
}

/// Well-known audit log location for a working directory.
pub fn audit_path(cwd: &Path) -> PathBuf {
    cwd.join(".ralph").join("audit.jsonl")
}

pub async fn write_snapshot(path: &Path, snap: &SessionSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(snap)?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await.map_err(Error::Io)
}

pub async fn read_snapshot(path: &Path) -> Result<SessionSnapshot> {
    let content = fs::read_to_string(path).await?;
    serde_json::from_str(&content).map_err(Error::Json)
}
