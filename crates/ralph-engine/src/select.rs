//! Task selection
//!
//! SELECT picks the first pending task whose dependencies are all completed,
//! tie-breaking by explicit priority (lower value first), then tracker
//! order. A dependency that is cancelled - or absent from the snapshot -
//! keeps the task blocked; promotion requires operator action in the
//! tracker.

use std::collections::HashSet;

use ralph_core::{Task, TaskStatus};

pub fn select_task(tasks: &[Task]) -> Option<&Task> {
    let completed: HashSet<&str> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .map(|t| t.id.as_str())
        .collect();

    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| t.depends_on.iter().all(|d| completed.contains(d.as_str())))
        .min_by_key(|t| t.priority.unwrap_or(i32::MAX))
}
