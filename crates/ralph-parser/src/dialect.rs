//! Vendor dialect decoders
//!
//! Three CLI vendors emit three different line-JSON shapes. Each decoder
//! takes one parsed JSON value and yields normalized `StructuredEvent`s.
//! Dialect B packs spawn and completion into a single `tool_use` line, so
//! its decoder synthesizes two logical events (spawn strictly before
//! result) to keep the downstream stream uniform.

use crate::event::StructuredEvent;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// "Claude-like": `type` + content blocks, spawn/result on separate lines.
    Claude,
    /// "OpenCode-like": `part` object with `callID` and a `state`.
    OpenCode,
    /// "Droid-like": Claude's structure with renamed id fields.
    Droid,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Claude => write!(f, "claude"),
            Self::OpenCode => write!(f, "opencode"),
            Self::Droid => write!(f, "droid"),
        }
    }
}

impl Dialect {
    pub fn decode(&self, value: &Value) -> Vec<StructuredEvent> {
        match self {
            Self::Claude => decode_claude_like(value, &CLAUDE_FIELDS),
            Self::Droid => decode_claude_like(value, &DROID_FIELDS),
            Self::OpenCode => decode_opencode(value),
        }
    }
}

/// Field names that differ between the Claude-like dialects.
struct FieldNames {
    tool_name: &'static str,
    call_id: &'static str,
    result_ref: &'static str,
}

const CLAUDE_FIELDS: FieldNames = FieldNames {
    tool_name: "name",
    call_id: "id",
    result_ref: "tool_use_id",
};

const DROID_FIELDS: FieldNames = FieldNames {
    tool_name: "toolName",
    call_id: "callId",
    result_ref: "callId",
};

fn decode_claude_like(v: &Value, f: &FieldNames) -> Vec<StructuredEvent> {
    let ts = parse_ts(v);
    let ty = v.get("type").and_then(Value::as_str).unwrap_or_default();
    let mut events = Vec::new();

    match ty {
        "assistant" => {
            for block in content_blocks(v) {
                match block.get("type").and_then(Value::as_str) {
                    Some("text") => {
                        if let Some(t) = block.get("text").and_then(Value::as_str) {
                            events.push(StructuredEvent {
                                ts,
                                ..StructuredEvent::text(t)
                            });
                        }
                    }
                    Some("tool_use") => {
                        let tool = block
                            .get(f.tool_name)
                            .and_then(Value::as_str)
                            .unwrap_or("unknown");
                        if let Some(id) = block.get(f.call_id).and_then(Value::as_str) {
                            let mut ev = StructuredEvent::spawn(tool, id);
                            ev.input = block.get("input").cloned();
                            ev.status = Some("running".into());
                            ev.ts = ts;
                            events.push(ev);
                        }
                    }
                    _ => {}
                }
            }
        }
        "user" => {
            for block in content_blocks(v) {
                if block.get("type").and_then(Value::as_str) != Some("tool_result") {
                    continue;
                }
                if let Some(id) = block.get(f.result_ref).and_then(Value::as_str) {
                    let mut ev = StructuredEvent::result(id);
                    ev.output = block.get("content").and_then(content_to_string);
                    ev.is_error = block
                        .get("is_error")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    ev.status = Some(if ev.is_error { "error" } else { "completed" }.into());
                    ev.ts = ts;
                    events.push(ev);
                }
            }
        }
        "result" => {
            let mut ev = match v.get("result").and_then(Value::as_str) {
                Some(t) => StructuredEvent::text(t),
                None => StructuredEvent::other(),
            };
            ev.is_error = v.get("is_error").and_then(Value::as_bool).unwrap_or(false);
            ev.ts = ts;
            events.push(ev);
        }
        _ => {}
    }

    if events.is_empty() {
        events.push(StructuredEvent {
            ts,
            ..StructuredEvent::other()
        });
    }
    events
}

fn decode_opencode(v: &Value) -> Vec<StructuredEvent> {
    let ts = parse_ts(v);
    let mut events = Vec::new();

    if let Some(part) = v.get("part") {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            events.push(StructuredEvent {
                ts,
                ..StructuredEvent::text(text)
            });
        } else if let Some(tool) = part.get("tool").and_then(Value::as_str) {
            if let Some(id) = part.get("callID").and_then(Value::as_str) {
                let state = part.get("state");
                let status = state
                    .and_then(|s| s.get("status"))
                    .and_then(Value::as_str)
                    .unwrap_or("running");
                let output = state
                    .and_then(|s| s.get("output"))
                    .and_then(content_to_string);

                let mut spawn = StructuredEvent::spawn(tool, id);
                spawn.input = state.and_then(|s| s.get("input")).cloned();
                spawn.status = Some("running".into());
                spawn.ts = ts;
                events.push(spawn);

                // Terminal state packed into the same line: emit the result
                // right behind its spawn.
                if matches!(status, "completed" | "error") || output.is_some() {
                    let mut res = StructuredEvent::result(id);
                    res.is_error = status == "error";
                    res.output = output;
                    res.status = Some(if res.is_error { "error" } else { "completed" }.into());
                    res.ts = ts;
                    events.push(res);
                }
            }
        }
    }

    if events.is_empty() {
        events.push(StructuredEvent {
            ts,
            ..StructuredEvent::other()
        });
    }
    events
}

/// Content blocks live under `message.content` or top-level `content`.
fn content_blocks(v: &Value) -> impl Iterator<Item = &Value> {
    v.pointer("/message/content")
        .or_else(|| v.get("content"))
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

/// Tool-result content is either a bare string or an array of text blocks.
fn content_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let parts: Vec<&str> = items
                .iter()
                .filter_map(|b| {
                    b.get("text")
                        .and_then(Value::as_str)
                        .or_else(|| b.as_str())
                })
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

/// `timestamp` is epoch milliseconds in Dialect B, RFC 3339 elsewhere.
fn parse_ts(v: &Value) -> Option<DateTime<Utc>> {
    match v.get("timestamp") {
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn decode_one(dialect: Dialect, json: &str) -> Vec<StructuredEvent> {
        dialect.decode(&serde_json::from_str(json).unwrap())
    }

    #[test]
    fn claude_task_spawn() {
        let events = decode_one(
            Dialect::Claude,
            r#"{"type":"assistant","message":{"content":[
                {"type":"tool_use","id":"toolu_1","name":"Task","input":{"description":"explore"}}
            ]}}"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Spawn);
        assert_eq!(events[0].tool.as_deref(), Some("Task"));
        assert_eq!(events[0].call_id.as_deref(), Some("toolu_1"));
    }

    #[test]
    fn claude_tool_result_matches_spawn_id() {
        let events = decode_one(
            Dialect::Claude,
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","tool_use_id":"toolu_1","content":"done","is_error":false}
            ]}}"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Result);
        assert_eq!(events[0].call_id.as_deref(), Some("toolu_1"));
        assert_eq!(events[0].output.as_deref(), Some("done"));
        assert!(!events[0].is_error);
    }

    #[test]
    fn claude_error_result_flags() {
        let events = decode_one(
            Dialect::Claude,
            r#"{"type":"user","message":{"content":[
                {"type":"tool_result","tool_use_id":"t2","content":[{"type":"text","text":"boom"}],"is_error":true}
            ]}}"#,
        );
        assert!(events[0].is_error);
        assert_eq!(events[0].output.as_deref(), Some("boom"));
    }

    #[test]
    fn claude_mixed_content_emits_text_and_spawn_in_order() {
        let events = decode_one(
            Dialect::Claude,
            r#"{"type":"assistant","message":{"content":[
                {"type":"text","text":"let me check"},
                {"type":"tool_use","id":"t3","name":"Read","input":{}}
            ]}}"#,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Text);
        assert_eq!(events[1].kind, EventKind::Spawn);
    }

    #[test]
    fn opencode_completed_tool_use_synthesizes_spawn_then_result() {
        let events = decode_one(
            Dialect::OpenCode,
            r#"{"type":"tool_use","timestamp":1718000000000,"sessionID":"s1","part":{
                "tool":"Task","callID":"c1",
                "state":{"status":"completed","input":{"prompt":"fix it"},"output":"all good"}
            }}"#,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Spawn);
        assert_eq!(events[1].kind, EventKind::Result);
        assert_eq!(events[0].call_id, events[1].call_id);
        assert_eq!(events[1].output.as_deref(), Some("all good"));
        assert!(events[0].ts.is_some());
    }

    #[test]
    fn opencode_running_tool_use_is_spawn_only() {
        let events = decode_one(
            Dialect::OpenCode,
            r#"{"type":"tool_use","part":{"tool":"Bash","callID":"c2","state":{"status":"running","input":{}}}}"#,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Spawn);
    }

    #[test]
    fn droid_renamed_fields_decode_like_claude() {
        let events = decode_one(
            Dialect::Droid,
            r#"{"type":"assistant","message":{"content":[
                {"type":"tool_use","callId":"d1","toolName":"Task","input":{}}
            ]}}"#,
        );
        assert_eq!(events[0].kind, EventKind::Spawn);
        assert_eq!(events[0].call_id.as_deref(), Some("d1"));
        assert_eq!(events[0].tool.as_deref(), Some("Task"));
    }

    #[test]
    fn unknown_type_becomes_other() {
        let events = decode_one(Dialect::Claude, r#"{"type":"system","subtype":"init"}"#);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Other);
    }

    #[test]
    fn result_line_carries_text() {
        let events = decode_one(
            Dialect::Claude,
            r#"{"type":"result","result":"final answer","is_error":false}"#,
        );
        assert_eq!(events[0].kind, EventKind::Text);
        assert_eq!(events[0].text.as_deref(), Some("final answer"));
    }
}
