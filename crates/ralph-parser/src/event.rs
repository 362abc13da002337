//! Parsed event types - the parser's output vocabulary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Spawn,
    Result,
    Text,
    Other,
}

/// A vendor line normalized into the common shape all three dialects share.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredEvent {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
}

impl StructuredEvent {
    pub fn other() -> Self {
        Self {
            kind: EventKind::Other,
            tool: None,
            call_id: None,
            input: None,
            output: None,
            status: None,
            is_error: false,
            text: None,
            ts: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Text,
            text: Some(text.into()),
            ..Self::other()
        }
    }

    pub fn spawn(tool: impl Into<String>, call_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Spawn,
            tool: Some(tool.into()),
            call_id: Some(call_id.into()),
            ..Self::other()
        }
    }

    pub fn result(call_id: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Result,
            call_id: Some(call_id.into()),
            ..Self::other()
        }
    }
}

/// One unit of parser output, in the exact order the terminating newline of
/// its source line was observed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ParsedEvent {
    /// A line with no JSON object in it.
    Line { text: String },
    Structured(StructuredEvent),
    /// Malformed JSON or an orphaned result. Never aborts the stream.
    ParseError { raw: String, reason: String },
}

impl ParsedEvent {
    pub fn line(text: impl Into<String>) -> Self {
        Self::Line { text: text.into() }
    }
}
