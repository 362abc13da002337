//! Subagent tree reconstruction
//!
//! An arena keyed by vendor call id. Parent links are arena ids, never
//! pointers; a node's parent always precedes it in the arena, so emission
//! order doubles as a topological order.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use ralph_core::subagent::{SubagentNode, SubagentStatus};

use crate::event::{EventKind, StructuredEvent};

/// What one event did to the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeDelta {
    Spawned(SubagentNode),
    /// A repeat spawn filled in details on a still-running node.
    Updated(SubagentNode),
    Finished(SubagentNode),
    /// A result with no prior spawn for its call id.
    Unmatched(String),
}

#[derive(Debug, Default)]
pub struct SubagentTree {
    nodes: Vec<SubagentNode>,
    by_call: HashMap<String, u32>,
    /// Ids of still-running nodes, spawn order. The top is the attachment
    /// point for the next spawn.
    running: Vec<u32>,
}

impl SubagentTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one normalized event. Returns None for events that do not touch
    /// the tree (text, other, duplicate spawns, repeat results).
    pub fn apply(&mut self, ev: &StructuredEvent) -> Option<TreeDelta> {
        match ev.kind {
            EventKind::Spawn => self.apply_spawn(ev),
            EventKind::Result => self.apply_result(ev),
            _ => None,
        }
    }

    fn apply_spawn(&mut self, ev: &StructuredEvent) -> Option<TreeDelta> {
        let call_id = ev.call_id.as_deref()?;
        if let Some(&id) = self.by_call.get(call_id) {
            // Dialect B re-announces a tool on every state change; a repeat
            // spawn may carry input the first one lacked.
            let node = &mut self.nodes[id as usize];
            if node.is_terminal() {
                return None;
            }
            let description = describe(ev.input.as_ref());
            if !description.is_empty() && node.description != description {
                node.description = description;
                return Some(TreeDelta::Updated(node.clone()));
            }
            return None;
        }

        let id = self.nodes.len() as u32;
        let parent = self.running.last().copied();
        let depth = parent
            .map(|p| self.nodes[p as usize].depth + 1)
            .unwrap_or(0);

        let node = SubagentNode {
            id,
            call_id: call_id.to_string(),
            tool: ev.tool.clone().unwrap_or_else(|| "unknown".to_string()),
            description: describe(ev.input.as_ref()),
            status: SubagentStatus::Running,
            spawned_at: ev.ts.unwrap_or_else(Utc::now),
            ended_at: None,
            duration_ms: None,
            output: None,
            parent,
            children: Vec::new(),
            depth,
        };

        if let Some(p) = parent {
            self.nodes[p as usize].children.push(id);
        }
        self.by_call.insert(call_id.to_string(), id);
        self.running.push(id);
        self.nodes.push(node.clone());
        Some(TreeDelta::Spawned(node))
    }

    fn apply_result(&mut self, ev: &StructuredEvent) -> Option<TreeDelta> {
        let call_id = ev.call_id.as_deref()?;
        let Some(&id) = self.by_call.get(call_id) else {
            return Some(TreeDelta::Unmatched(call_id.to_string()));
        };

        let node = &mut self.nodes[id as usize];
        if node.is_terminal() {
            return None;
        }

        node.status = if ev.is_error {
            SubagentStatus::Error
        } else {
            SubagentStatus::Completed
        };
        node.output = ev.output.clone();
        let ended = ev.ts.unwrap_or_else(Utc::now);
        node.ended_at = Some(ended);
        node.duration_ms = Some((ended - node.spawned_at).num_milliseconds().max(0) as u64);

        let frozen = node.clone();
        self.running.retain(|&r| r != id);
        Some(TreeDelta::Finished(frozen))
    }

    /// End of iteration: any spawn that never saw its result is force-closed
    /// as an error. Returns the nodes that were closed.
    pub fn finalize(&mut self) -> Vec<SubagentNode> {
        let mut closed = Vec::new();
        for id in std::mem::take(&mut self.running) {
            let node = &mut self.nodes[id as usize];
            node.status = SubagentStatus::Error;
            if node.output.is_none() {
                node.output = Some("incomplete".to_string());
            }
            closed.push(node.clone());
        }
        closed
    }

    pub fn nodes(&self) -> &[SubagentNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<SubagentNode> {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Best-effort human description from a spawn's input payload.
fn describe(input: Option<&Value>) -> String {
    let Some(input) = input else {
        return String::new();
    };
    for key in ["description", "prompt", "title", "command"] {
        if let Some(s) = input.get(key).and_then(Value::as_str) {
            let mut s = s.to_string();
            if s.len() > 120 {
                s.truncate(s.char_indices().take(117).last().map(|(i, c)| i + c.len_utf8()).unwrap_or(0));
                s.push_str("...");
            }
            return s;
        }
    }
    String::new()
}
