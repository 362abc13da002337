//! Ralph configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RalphConfig {
    pub agent: AgentSection,
    pub tracker: TrackerSection,
    pub engine: EngineTuning,
    pub prompt: PromptSection,
    /// Per-plugin setup answers, keyed by plugin id then question id.
    pub plugins: HashMap<String, HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Agent runner plugin id.
    pub plugin: String,
    /// Model override passed through to the vendor CLI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Reasoning-effort level, where the vendor CLI supports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
    /// Binary override; defaults to the runner's `default_binary`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    /// Tracker plugin id.
    pub plugin: String,
    /// Task file path for the file-backed trackers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Iteration cap; 0 = unlimited.
    pub iterations: u32,
    /// Retries per iteration before the error becomes fatal.
    pub max_retries: u32,
    /// Exponential backoff base, seconds.
    pub backoff_base_secs: u64,
    /// Backoff ceiling, seconds.
    pub backoff_cap_secs: u64,
    /// How long to let the child exit naturally after the completion
    /// sentinel before interrupting.
    pub completion_grace_secs: u64,
    /// SIGINT→SIGKILL escalation window on stop.
    pub stop_grace_secs: u64,
    /// Per-iteration output capture bound, bytes.
    pub output_capture_bytes: usize,
    /// Per-subscriber event queue depth.
    pub subscriber_queue: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSection {
    /// Template with `{{task_id}}`, `{{task_title}}`, `{{task_description}}`
    /// placeholders. None = built-in default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Template file; takes precedence over `template` when both are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,
}

impl Default for RalphConfig {
    fn default() -> Self {
        Self {
            agent: AgentSection::default(),
            tracker: TrackerSection::default(),
            engine: EngineTuning::default(),
            prompt: PromptSection::default(),
            plugins: HashMap::new(),
        }
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            plugin: "claude".to_string(),
            model: None,
            reasoning_effort: None,
            binary: None,
        }
    }
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            plugin: "json".to_string(),
            path: None,
        }
    }
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            iterations: 0,
            max_retries: 3,
            backoff_base_secs: 2,
            backoff_cap_secs: 60,
            completion_grace_secs: 10,
            stop_grace_secs: 5,
            output_capture_bytes: 4 * 1024 * 1024,
            subscriber_queue: 1024,
        }
    }
}

impl Default for PromptSection {
    fn default() -> Self {
        Self {
            template: None,
            template_path: None,
        }
    }
}

impl RalphConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Setup answers for one plugin id (empty map if unset).
    pub fn plugin_answers(&self, id: &str) -> HashMap<String, serde_json::Value> {
        self.plugins.get(id).cloned().unwrap_or_default()
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = RalphConfig::default();
        assert_eq!(c.agent.plugin, "claude");
        assert_eq!(c.engine.max_retries, 3);
        assert_eq!(c.engine.backoff_base_secs, 2);
        assert_eq!(c.engine.output_capture_bytes, 4 * 1024 * 1024);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: RalphConfig = toml::from_str(
            r#"
            [agent]
            plugin = "droid"

            [engine]
            iterations = 5
            "#,
        )
        .unwrap();
        assert_eq!(c.agent.plugin, "droid");
        assert_eq!(c.engine.iterations, 5);
        assert_eq!(c.engine.max_retries, 3);
        assert_eq!(c.tracker.plugin, "json");
    }

    #[test]
    fn plugin_answers_parse_into_json_values() {
        let c: RalphConfig = toml::from_str(
            r#"
            [plugins.droid]
            auto_permissions = true
            binary = "droid"
            "#,
        )
        .unwrap();
        let answers = c.plugin_answers("droid");
        assert_eq!(answers["auto_permissions"], serde_json::Value::Bool(true));
        assert!(c.plugin_answers("claude").is_empty());
    }

    #[test]
    fn round_trips_through_toml() {
        let c = RalphConfig::default();
        let s = c.to_toml();
        let back: RalphConfig = toml::from_str(&s).unwrap();
        assert_eq!(back.engine.subscriber_queue, c.engine.subscriber_queue);
    }
}
