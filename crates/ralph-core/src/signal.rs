//! Detector signals - the shared vocabulary between parser and engine

use serde::{Deserialize, Serialize};

/// Error classes that abort an iteration without retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalKind {
    Auth,
    MissingBinary,
    InvalidPrompt,
    ToolError,
    PluginCrash,
}

impl std::fmt::Display for FatalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "auth"),
            Self::MissingBinary => write!(f, "missing_binary"),
            Self::InvalidPrompt => write!(f, "invalid_prompt"),
            Self::ToolError => write!(f, "tool_error"),
            Self::PluginCrash => write!(f, "plugin_crash"),
        }
    }
}

/// A terminal signal raised by one of the three detectors. The first signal
/// observed in stream order wins the iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    /// The completion sentinel was seen in the iteration's text.
    Completion,
    /// A rate-limit pattern matched; `retry_after_secs` is the extracted hint.
    RateLimited {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// An unrecoverable condition.
    Fatal { kind: FatalKind, message: String },
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::RateLimited { .. } => "rate_limited",
            Self::Fatal { .. } => "fatal",
        }
    }
}
