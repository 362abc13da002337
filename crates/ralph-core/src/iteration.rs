//! Iteration records - one SELECT→…→UPDATE loop pass

use crate::subagent::SubagentNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationOutcome {
    Completed,
    Interrupted,
    Error,
    RateLimited,
    NoTask,
}

impl std::fmt::Display for IterationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Interrupted => write!(f, "interrupted"),
            Self::Error => write!(f, "error"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::NoTask => write!(f, "no_task"),
        }
    }
}

/// A sealed loop pass. Created on entering Executing, immutable once the
/// engine appends it to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-based, strictly monotonic within a session.
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: IterationOutcome,
    /// Captured stdout+stderr, bounded; see `output_truncated`.
    pub output: String,
    #[serde(default)]
    pub output_truncated: bool,
    /// The reconstructed subagent tree, frozen at seal time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subagents: Vec<SubagentNode>,
}

impl Iteration {
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}
