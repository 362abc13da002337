//! Engine state machine variants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineState {
    Ready,
    Selecting,
    Building,
    Executing {
        iteration: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        child_pid: Option<u32>,
        started_at: DateTime<Utc>,
    },
    Paused {
        prev: Box<EngineState>,
    },
    Stopping,
    Stopped,
    Complete,
    Error {
        kind: String,
    },
}

impl EngineState {
    /// Stable variant name for snapshots and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Selecting => "selecting",
            Self::Building => "building",
            Self::Executing { .. } => "executing",
            Self::Paused { .. } => "paused",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Complete => "complete",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Error { .. })
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Selecting | Self::Building | Self::Executing { .. }
        )
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Paused { prev } => write!(f, "paused({prev})"),
            Self::Error { kind } => write!(f, "error({kind})"),
            Self::Executing { iteration, .. } => write!(f, "executing(#{iteration})"),
            other => write!(f, "{}", other.name()),
        }
    }
}
