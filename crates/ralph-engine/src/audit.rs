//! Append-only audit log
//!
//! JSONL records at a well-known path, written by a dedicated task so the
//! driver never blocks on disk. The queue is bounded: under pressure records
//! are lost, never awaited. Rotation: when the file passes the size cap it
//! is renamed to `<name>.old` (replacing any prior `.old`) and a fresh file
//! is opened - there are only ever two files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
const QUEUE_DEPTH: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub client_id: String,
    pub action: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Cheap handle for emitting records. Cloneable; the writer task exits once
/// every handle is dropped.
#[derive(Clone)]
pub struct AuditLog {
    tx: mpsc::Sender<AuditRecord>,
    client_id: String,
}

impl AuditLog {
    pub fn open(path: impl Into<PathBuf>, client_id: impl Into<String>) -> (Self, JoinHandle<()>) {
        Self::with_max_bytes(path, client_id, DEFAULT_MAX_BYTES)
    }

    pub fn with_max_bytes(
        path: impl Into<PathBuf>,
        client_id: impl Into<String>,
        max_bytes: u64,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let writer = tokio::spawn(run_writer(path.into(), max_bytes, rx));
        (
            Self {
                tx,
                client_id: client_id.into(),
            },
            writer,
        )
    }

    /// Fire-and-forget. A full queue drops the record rather than blocking.
    pub fn record(&self, action: &str, success: bool) {
        self.record_with(action, success, None, None);
    }

    pub fn record_with(
        &self,
        action: &str,
        success: bool,
        error: Option<String>,
        details: Option<serde_json::Value>,
    ) {
        let record = AuditRecord {
            ts: Utc::now(),
            client_id: self.client_id.clone(),
            action: action.to_string(),
            success,
            error,
            details,
        };
        let _ = self.tx.try_send(record);
    }
}

async fn run_writer(path: PathBuf, max_bytes: u64, mut rx: mpsc::Receiver<AuditRecord>) {
    if let Some(parent) = path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }

    let mut file = match open_append(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!("audit log unavailable at {}: {e}", path.display());
            // Drain and discard so senders never notice.
            while rx.recv().await.is_some() {}
            return;
        }
    };
    let mut size = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

    while let Some(record) = rx.recv().await {
        let mut line = match serde_json::to_string(&record) {
            Ok(l) => l,
            Err(_) => continue,
        };
        line.push('\n');

        if size + line.len() as u64 > max_bytes {
            drop(file);
            let old = rotated_path(&path);
            if let Err(e) = tokio::fs::rename(&path, &old).await {
                warn!("audit rotation failed: {e}");
            }
            file = match open_append(&path).await {
                Ok(f) => f,
                Err(e) => {
                    warn!("audit reopen failed: {e}");
                    while rx.recv().await.is_some() {}
                    return;
                }
            };
            size = 0;
        }

        if file.write_all(line.as_bytes()).await.is_ok() {
            size += line.len() as u64;
            let _ = file.flush().await;
        }
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".old");
    path.with_file_name(name)
}
