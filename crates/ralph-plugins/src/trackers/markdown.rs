//! Markdown PRD tracker
//!
//! Reads a product-requirements markdown file and treats checklist items as
//! tasks: `- [ ]` is pending, `- [x]` is completed. Ids are positional
//! (`prd-1`, `prd-2`, …) in document order; indented lines following an item
//! become its description. Completion rewrites the checkbox in place and
//! leaves the rest of the document untouched.

use std::path::{Path, PathBuf};

use tokio::fs;

use ralph_core::{CompleteOutcome, Error, Result, Task, TaskFilter, TaskStatus};

use crate::setup::SetupQuestion;
use crate::tracker::{Tracker, TrackerMeta};

pub struct MarkdownTracker {
    path: PathBuf,
}

struct ChecklistItem {
    /// Index of the `- [ ]` line in the document.
    line: usize,
    checked: bool,
    title: String,
    description: String,
}

impl MarkdownTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).await.map_err(|e| {
            Error::tracker("markdown", format!("read {}: {e}", self.path.display()))
        })
    }

    fn parse(content: &str) -> Vec<ChecklistItem> {
        let mut items: Vec<ChecklistItem> = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim_start();
            if let Some(rest) = checklist_rest(trimmed) {
                items.push(ChecklistItem {
                    line: i,
                    checked: is_checked(trimmed),
                    title: rest.trim().to_string(),
                    description: String::new(),
                });
            } else if let Some(item) = items.last_mut() {
                // Indented continuation lines extend the previous item.
                if line.starts_with("  ") && !trimmed.is_empty() {
                    if !item.description.is_empty() {
                        item.description.push('\n');
                    }
                    item.description.push_str(trimmed);
                }
            }
        }
        items
    }

    fn to_task(ordinal: usize, item: &ChecklistItem) -> Task {
        Task {
            id: format!("prd-{}", ordinal + 1),
            title: item.title.clone(),
            description: item.description.clone(),
            priority: None,
            status: if item.checked {
                TaskStatus::Completed
            } else {
                TaskStatus::Pending
            },
            depends_on: Vec::new(),
            parent: None,
        }
    }

    /// Ordinal for an id like `prd-3`.
    fn ordinal(id: &str) -> Option<usize> {
        id.strip_prefix("prd-")?.parse::<usize>().ok()?.checked_sub(1)
    }

    async fn set_checked(&self, id: &str, checked: bool) -> Result<Option<CompleteOutcome>> {
        let content = self.read().await?;
        let items = Self::parse(&content);
        let Some(ordinal) = Self::ordinal(id) else {
            return Ok(None);
        };
        let Some(item) = items.get(ordinal) else {
            return Ok(None);
        };
        if item.checked == checked {
            return Ok(Some(CompleteOutcome::AlreadyCompleted));
        }

        let mut lines: Vec<String> = content.lines().map(String::from).collect();
        let line = &lines[item.line];
        let rewritten = if checked {
            line.replacen("[ ]", "[x]", 1)
        } else {
            let once = line.replacen("[x]", "[ ]", 1);
            if once == *line {
                line.replacen("[X]", "[ ]", 1)
            } else {
                once
            }
        };
        lines[item.line] = rewritten;

        let mut out = lines.join("\n");
        if content.ends_with('\n') {
            out.push('\n');
        }
        fs::write(&self.path, out).await.map_err(|e| {
            Error::tracker("markdown", format!("write {}: {e}", self.path.display()))
        })?;
        Ok(Some(CompleteOutcome::Completed))
    }
}

fn checklist_rest(trimmed: &str) -> Option<&str> {
    trimmed
        .strip_prefix("- [ ]")
        .or_else(|| trimmed.strip_prefix("- [x]"))
        .or_else(|| trimmed.strip_prefix("- [X]"))
}

fn is_checked(trimmed: &str) -> bool {
    trimmed.starts_with("- [x]") || trimmed.starts_with("- [X]")
}

#[async_trait::async_trait]
impl Tracker for MarkdownTracker {
    fn meta(&self) -> TrackerMeta {
        TrackerMeta {
            id: "markdown",
            display_name: "Markdown PRD checklist",
            supports_sync: false,
        }
    }

    fn setup_questions(&self) -> Vec<SetupQuestion> {
        vec![SetupQuestion::path("path", "Path to the PRD markdown file")
            .with_default(serde_json::json!("PRD.md"))]
    }

    async fn get_tasks(&mut self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let content = self.read().await?;
        Ok(Self::parse(&content)
            .iter()
            .enumerate()
            .map(|(i, item)| Self::to_task(i, item))
            .filter(|t| filter.status.map(|s| t.status == s).unwrap_or(true))
            .collect())
    }

    async fn complete_task(&mut self, id: &str, _reason: Option<&str>) -> Result<CompleteOutcome> {
        self.set_checked(id, true)
            .await?
            .ok_or_else(|| Error::tracker("markdown", format!("unknown task: {id}")))
    }

    async fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<Option<Task>> {
        // Only the two checkbox states are representable.
        let checked = match status {
            TaskStatus::Completed => true,
            TaskStatus::Pending => false,
            _ => return Ok(None),
        };
        if self.set_checked(id, checked).await?.is_none() {
            return Ok(None);
        }
        let content = self.read().await?;
        Ok(Self::ordinal(id)
            .and_then(|o| Self::parse(&content).get(o).map(|item| Self::to_task(o, item))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PRD: &str = "# My Product\n\nSome intro text.\n\n- [ ] Build the login page\n  With OAuth support\n- [x] Set up CI\n- [ ] Write the docs\n";

    async fn tracker() -> (TempDir, MarkdownTracker) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("PRD.md");
        std::fs::write(&path, PRD).unwrap();
        (dir, MarkdownTracker::new(path))
    }

    #[tokio::test]
    async fn parses_checklist_items_in_order() {
        let (_dir, mut t) = tracker().await;
        let tasks = t.get_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].id, "prd-1");
        assert_eq!(tasks[0].title, "Build the login page");
        assert_eq!(tasks[0].description, "With OAuth support");
        assert_eq!(tasks[1].status, TaskStatus::Completed);
        assert_eq!(tasks[2].status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn pending_filter_hides_checked_items() {
        let (_dir, mut t) = tracker().await;
        let pending = t.get_tasks(&TaskFilter::pending()).await.unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[tokio::test]
    async fn complete_rewrites_checkbox_in_place() {
        let (_dir, mut t) = tracker().await;
        assert_eq!(
            t.complete_task("prd-1", None).await.unwrap(),
            CompleteOutcome::Completed
        );

        let content = std::fs::read_to_string(t.path()).unwrap();
        assert!(content.contains("- [x] Build the login page"));
        // Everything else untouched
        assert!(content.contains("Some intro text."));
        assert!(content.contains("- [ ] Write the docs"));
    }

    #[tokio::test]
    async fn completing_checked_item_reports_already() {
        let (_dir, mut t) = tracker().await;
        assert_eq!(
            t.complete_task("prd-2", None).await.unwrap(),
            CompleteOutcome::AlreadyCompleted
        );
    }

    #[tokio::test]
    async fn unknown_id_errors() {
        let (_dir, mut t) = tracker().await;
        assert!(t.complete_task("prd-99", None).await.is_err());
        assert!(t.complete_task("garbage", None).await.is_err());
    }

    #[tokio::test]
    async fn uncheck_via_update_status() {
        let (_dir, mut t) = tracker().await;
        let task = t
            .update_task_status("prd-2", TaskStatus::Pending)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        let content = std::fs::read_to_string(t.path()).unwrap();
        assert!(content.contains("- [ ] Set up CI"));
    }

    #[tokio::test]
    async fn unrepresentable_status_returns_none() {
        let (_dir, mut t) = tracker().await;
        assert!(t
            .update_task_status("prd-1", TaskStatus::Blocked)
            .await
            .unwrap()
            .is_none());
    }
}
