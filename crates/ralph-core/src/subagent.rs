//! Subagent tree nodes reconstructed from agent structured output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for SubagentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// One node of an iteration's subagent tree. Nodes live in an arena; parent
/// and children are arena ids, never pointers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentNode {
    /// Arena id, stable for the iteration.
    pub id: u32,
    /// Vendor call id this node was keyed on.
    pub call_id: String,
    /// Vendor tool name, e.g. "Task", "Bash", "Read".
    pub tool: String,
    #[serde(default)]
    pub description: String,
    pub status: SubagentStatus,
    pub spawned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<u32>,
    /// depth(parent) + 1; roots are 0.
    pub depth: u32,
}

impl SubagentNode {
    pub fn is_terminal(&self) -> bool {
        self.status != SubagentStatus::Running
    }
}
