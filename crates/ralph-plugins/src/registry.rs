//! Plugin registry
//!
//! Holds built-in and user-supplied factories, resolves plugins by id, and
//! validates setup answers before anything launches.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use ralph_core::{Error, Result};

use crate::runner::{AgentRunner, RunnerMeta};
use crate::runners::{ClaudeRunner, DroidRunner, OpenCodeRunner};
use crate::setup::{validate_answers, SetupAnswers};
use crate::tracker::{Tracker, TrackerMeta};
use crate::trackers::{JsonFileTracker, MarkdownTracker};

type TrackerFactory = Arc<dyn Fn(&SetupAnswers) -> Result<Box<dyn Tracker>> + Send + Sync>;

struct TrackerEntry {
    meta: TrackerMeta,
    factory: TrackerFactory,
}

#[derive(Default)]
pub struct PluginRegistry {
    runners: DashMap<String, Arc<dyn AgentRunner>>,
    trackers: DashMap<String, TrackerEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in runners and trackers.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_runner(Arc::new(ClaudeRunner));
        registry.register_runner(Arc::new(OpenCodeRunner));
        registry.register_runner(Arc::new(DroidRunner));

        registry.register_tracker(
            TrackerMeta {
                id: "json",
                display_name: "JSON task file",
                supports_sync: false,
            },
            Arc::new(|answers: &SetupAnswers| {
                let path = answer_path(answers, "path", "tasks.json");
                Ok(Box::new(JsonFileTracker::new(path)) as Box<dyn Tracker>)
            }),
        );
        registry.register_tracker(
            TrackerMeta {
                id: "markdown",
                display_name: "Markdown PRD checklist",
                supports_sync: false,
            },
            Arc::new(|answers: &SetupAnswers| {
                let path = answer_path(answers, "path", "PRD.md");
                Ok(Box::new(MarkdownTracker::new(path)) as Box<dyn Tracker>)
            }),
        );
        registry
    }

    /// Register a runner. Replaces any existing runner with the same id.
    pub fn register_runner(&self, runner: Arc<dyn AgentRunner>) {
        self.runners.insert(runner.meta().id.to_string(), runner);
    }

    pub fn register_tracker(&self, meta: TrackerMeta, factory: TrackerFactory) {
        self.trackers
            .insert(meta.id.to_string(), TrackerEntry { meta, factory });
    }

    pub fn runner(&self, id: &str) -> Result<Arc<dyn AgentRunner>> {
        self.runners
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::PluginNotFound(format!("agent runner '{id}'")))
    }

    pub fn create_tracker(&self, id: &str, answers: &SetupAnswers) -> Result<Box<dyn Tracker>> {
        let entry = self
            .trackers
            .get(id)
            .ok_or_else(|| Error::PluginNotFound(format!("tracker '{id}'")))?;
        (entry.factory)(answers)
    }

    pub fn runner_metas(&self) -> Vec<RunnerMeta> {
        let mut metas: Vec<RunnerMeta> = self.runners.iter().map(|r| r.meta()).collect();
        metas.sort_by_key(|m| m.id);
        metas
    }

    pub fn tracker_metas(&self) -> Vec<TrackerMeta> {
        let mut metas: Vec<TrackerMeta> = self.trackers.iter().map(|e| e.meta.clone()).collect();
        metas.sort_by_key(|m| m.id);
        metas
    }

    /// Validate answers for a runner: per-question type checks first, then
    /// the plugin's own `validate_setup`.
    pub fn validate_runner_setup(&self, id: &str, answers: &SetupAnswers) -> Result<()> {
        let runner = self.runner(id)?;
        let mut errors = validate_answers(&runner.setup_questions(), answers);
        if let Some(err) = runner.validate_setup(answers) {
            errors.push(err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "{id} setup: {}",
                errors.join("; ")
            )))
        }
    }
}

fn answer_path(answers: &SetupAnswers, key: &str, default: &str) -> PathBuf {
    answers
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}
