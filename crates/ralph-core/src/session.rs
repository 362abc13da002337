//! Session identity and persisted snapshots

use crate::iteration::IterationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// What a `resume` does with the restored session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Restore as Paused; the user must continue explicitly.
    #[default]
    Paused,
    /// Restore and immediately re-enter the loop.
    Running,
}

/// One bound (working directory, agent, tracker) tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub id: String,
    pub cwd: PathBuf,
    /// Agent runner plugin id.
    pub agent: String,
    /// Setup answers for the agent plugin, keyed by question id.
    #[serde(default)]
    pub agent_config: HashMap<String, serde_json::Value>,
    /// Tracker plugin id.
    pub tracker: String,
    #[serde(default)]
    pub tracker_config: HashMap<String, serde_json::Value>,
    /// 0 = unlimited.
    #[serde(default)]
    pub iteration_cap: u32,
    #[serde(default)]
    pub resume: ResumePolicy,
    pub lock_path: PathBuf,
}

impl SessionConfig {
    pub fn new(cwd: impl Into<PathBuf>, agent: impl Into<String>, tracker: impl Into<String>) -> Self {
        let cwd = cwd.into();
        let lock_path = cwd.join(".ralph").join("session.lock");
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            cwd,
            agent: agent.into(),
            agent_config: HashMap::new(),
            tracker: tracker.into(),
            tracker_config: HashMap::new(),
            iteration_cap: 0,
            resume: ResumePolicy::Paused,
            lock_path,
        }
    }
}

/// Compact state written atomically on every IterationFinished and read back
/// by `resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub cwd: PathBuf,
    pub iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<IterationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_task_id: Option<String>,
    /// Engine state variant name at save time.
    pub state: String,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_byte_identical() {
        let snap = SessionSnapshot {
            session_id: "s-1".into(),
            cwd: PathBuf::from("/tmp/project"),
            iterations: 7,
            last_outcome: Some(IterationOutcome::Completed),
            last_task_id: Some("T7".into()),
            state: "complete".into(),
            saved_at: "2025-06-01T12:00:00Z".parse().unwrap(),
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
        assert_eq!(json, serde_json::to_string(&back).unwrap());
    }

    #[test]
    fn default_lock_path_lives_under_cwd() {
        let cfg = SessionConfig::new("/work/repo", "claude", "json");
        assert!(cfg.lock_path.starts_with("/work/repo"));
        assert_eq!(cfg.resume, ResumePolicy::Paused);
    }
}
