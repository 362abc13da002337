//! Task tracker plugin contract
//!
//! The tracker owns authoritative task state. The engine trusts a returned
//! snapshot for one iteration, serializes every call (trackers may be
//! thread-unsafe), and only ever mutates through `complete_task` /
//! `update_task_status`.

use ralph_core::{CompleteOutcome, Result, Task, TaskFilter, TaskStatus};

use crate::setup::SetupQuestion;

#[derive(Debug, Clone)]
pub struct TrackerMeta {
    pub id: &'static str,
    pub display_name: &'static str,
    /// Whether `sync()` does anything meaningful (bidirectional trackers).
    pub supports_sync: bool,
}

#[async_trait::async_trait]
pub trait Tracker: Send + Sync {
    fn meta(&self) -> TrackerMeta;

    fn setup_questions(&self) -> Vec<SetupQuestion> {
        Vec::new()
    }

    /// Enumerate candidate tasks matching the filter.
    async fn get_tasks(&mut self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Mark a task completed. Idempotent: completing a completed task
    /// succeeds with `AlreadyCompleted`.
    async fn complete_task(&mut self, id: &str, reason: Option<&str>) -> Result<CompleteOutcome>;

    /// Set a task's status; returns the updated task, or None when the
    /// tracker cannot represent the transition.
    async fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<Option<Task>>;

    /// Bidirectional sync, for trackers that advertise it.
    async fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
