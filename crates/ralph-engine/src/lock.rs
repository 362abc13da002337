//! Session lock file
//!
//! At most one live session per working directory. The lock records the
//! owner's pid and start time; a lock whose owner is no longer alive is
//! stale and may be adopted. Removal happens on graceful release and,
//! best-effort, on drop.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ralph_core::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
    released: bool,
}

impl SessionLock {
    /// Acquire the lock with create-new-only semantics. An existing lock is
    /// checked for owner liveness: dead owner → adopt; live owner → refuse
    /// unless `force`.
    pub fn acquire(path: &Path, force: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(Self::info_json().as_bytes())?;
                debug!("session lock acquired at {}", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let owner = Self::read_owner(path);
                match owner {
                    Some(info) if pid_alive(info.pid) && info.pid != std::process::id() => {
                        if !force {
                            return Err(Error::SessionLocked {
                                owner_pid: info.pid,
                            });
                        }
                        warn!("forcing takeover of live session lock (pid {})", info.pid);
                        std::fs::write(path, Self::info_json())?;
                    }
                    Some(info) => {
                        debug!("adopting stale session lock (dead pid {})", info.pid);
                        std::fs::write(path, Self::info_json())?;
                    }
                    None => {
                        // Unreadable lock: treat as stale.
                        std::fs::write(path, Self::info_json())?;
                    }
                }
            }
            Err(e) => return Err(Error::Io(e)),
        }

        Ok(Self {
            path: path.to_path_buf(),
            released: false,
        })
    }

    fn info_json() -> String {
        serde_json::to_string(&LockInfo {
            pid: std::process::id(),
            started_at: Utc::now(),
        })
        .expect("lock info serializes")
    }

    fn read_owner(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Graceful release: remove the file.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        std::fs::remove_file(&self.path).map_err(Error::Io)
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    // Signal 0 probes existence without delivering anything. EPERM still
    // means the process exists, we just can't signal it.
    let rc = unsafe { libc::kill(pid as i32, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    false
}
