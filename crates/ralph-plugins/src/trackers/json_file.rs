//! JSON file tracker
//!
//! The default tracker: a `tasks.json` holding an array of task records.
//! Supports the full status set, priorities, and dependencies. The file is
//! reread on every call - an external editor is a legitimate co-writer.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use ralph_core::{CompleteOutcome, Error, Result, Task, TaskFilter, TaskStatus};

use crate::setup::SetupQuestion;
use crate::tracker::{Tracker, TrackerMeta};

pub struct JsonFileTracker {
    path: PathBuf,
}

impl JsonFileTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<Task>> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            Error::tracker("json", format!("read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::tracker("json", format!("parse {}: {e}", self.path.display())))
    }

    async fn store(&self, tasks: &[Task]) -> Result<()> {
        let json = serde_json::to_string_pretty(tasks)?;
        fs::write(&self.path, json)
            .await
            .map_err(|e| Error::tracker("json", format!("write {}: {e}", self.path.display())))
    }

    fn matches(task: &Task, filter: &TaskFilter) -> bool {
        if let Some(status) = filter.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(parent) = &filter.parent {
            if task.parent.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        // labels / assignee are not modelled by this tracker
        true
    }
}

#[async_trait::async_trait]
impl Tracker for JsonFileTracker {
    fn meta(&self) -> TrackerMeta {
        TrackerMeta {
            id: "json",
            display_name: "JSON task file",
            supports_sync: false,
        }
    }

    fn setup_questions(&self) -> Vec<SetupQuestion> {
        vec![SetupQuestion::path("path", "Path to the tasks.json file")
            .with_default(serde_json::json!("tasks.json"))]
    }

    async fn get_tasks(&mut self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.load().await?;
        Ok(tasks
            .into_iter()
            .filter(|t| Self::matches(t, filter))
            .collect())
    }

    async fn complete_task(&mut self, id: &str, reason: Option<&str>) -> Result<CompleteOutcome> {
        let mut tasks = self.load().await?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::tracker("json", format!("unknown task: {id}")))?;

        if task.status == TaskStatus::Completed {
            return Ok(CompleteOutcome::AlreadyCompleted);
        }
        task.status = TaskStatus::Completed;
        debug!("task {} completed{}", id, reason.map(|r| format!(": {r}")).unwrap_or_default());
        self.store(&tasks).await?;
        Ok(CompleteOutcome::Completed)
    }

    async fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<Option<Task>> {
        let mut tasks = self.load().await?;
        let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        task.status = status;
        let updated = task.clone();
        self.store(&tasks).await?;
        Ok(Some(updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn tracker_with(tasks: &str) -> (TempDir, JsonFileTracker) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, tasks).unwrap();
        (dir, JsonFileTracker::new(path))
    }

    const TASKS: &str = r#"[
        {"id":"T1","title":"first","status":"pending","priority":2},
        {"id":"T2","title":"second","status":"pending","priority":1,"depends_on":["T1"]},
        {"id":"T3","title":"done already","status":"completed"}
    ]"#;

    #[tokio::test]
    async fn get_tasks_filters_by_status() {
        let (_dir, mut t) = tracker_with(TASKS).await;
        let pending = t.get_tasks(&TaskFilter::pending()).await.unwrap();
        assert_eq!(pending.len(), 2);
        let all = t.get_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let (_dir, mut t) = tracker_with(TASKS).await;
        assert_eq!(
            t.complete_task("T1", None).await.unwrap(),
            CompleteOutcome::Completed
        );
        assert_eq!(
            t.complete_task("T1", Some("again")).await.unwrap(),
            CompleteOutcome::AlreadyCompleted
        );

        let pending = t.get_tasks(&TaskFilter::pending()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "T2");
    }

    #[tokio::test]
    async fn complete_unknown_task_errors() {
        let (_dir, mut t) = tracker_with(TASKS).await;
        assert!(t.complete_task("nope", None).await.is_err());
    }

    #[tokio::test]
    async fn update_status_persists() {
        let (_dir, mut t) = tracker_with(TASKS).await;
        let updated = t
            .update_task_status("T2", TaskStatus::Blocked)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Blocked);

        // reread from disk
        let all = t.get_tasks(&TaskFilter::default()).await.unwrap();
        let t2 = all.iter().find(|t| t.id == "T2").unwrap();
        assert_eq!(t2.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn update_unknown_returns_none() {
        let (_dir, mut t) = tracker_with(TASKS).await;
        assert!(t
            .update_task_status("ghost", TaskStatus::Pending)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn parent_filter_applies() {
        let (_dir, mut t) = tracker_with(
            r#"[
            {"id":"E1","title":"epic","status":"pending"},
            {"id":"T1","title":"child","status":"pending","parent":"E1"}
        ]"#,
        )
        .await;
        let children = t
            .get_tasks(&TaskFilter::default().with_parent("E1"))
            .await
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, "T1");
    }
}
