//! Task model - the engine's read-through view of tracker state

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Blocked,
    Completed,
    Cancelled,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Blocked => write!(f, "blocked"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A task snapshot. The tracker owns authoritative state; the engine only
/// trusts this for the duration of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Lower value = more urgent (P1 before P2). Unprioritized tasks sort last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: None,
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            parent: None,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

/// Filter passed to `Tracker::get_tasks`. Built-in trackers honor the axes
/// they model and ignore the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub labels: Vec<String>,
    pub assignee: Option<String>,
    /// Parent / epic id.
    pub parent: Option<String>,
}

impl TaskFilter {
    pub fn pending() -> Self {
        Self {
            status: Some(TaskStatus::Pending),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Outcome of `Tracker::complete_task`. Completing twice is safe; the second
/// call reports `AlreadyCompleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    Completed,
    AlreadyCompleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&TaskStatus::InProgress).unwrap();
        assert_eq!(json, r#""in_progress""#);
    }

    #[test]
    fn task_round_trips() {
        let mut t = Task::new("T1", "Fix the slider");
        t.depends_on = vec!["T0".into()];
        t.priority = Some(1);
        let json = serde_json::to_string(&t).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }

    #[test]
    fn optional_fields_default_on_sparse_input() {
        let t: Task =
            serde_json::from_str(r#"{"id":"T1","title":"x","status":"pending"}"#).unwrap();
        assert!(t.depends_on.is_empty());
        assert!(t.priority.is_none());
        assert!(t.description.is_empty());
    }
}
