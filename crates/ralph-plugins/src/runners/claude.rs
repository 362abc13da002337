//! Claude Code runner (Dialect A)

use std::path::PathBuf;

use serde_json::json;

use ralph_parser::Dialect;

use crate::runner::{AgentRunner, ExecOptions, RunnerCapabilities, RunnerMeta};
use crate::setup::{SetupAnswers, SetupQuestion};

pub struct ClaudeRunner;

#[async_trait::async_trait]
impl AgentRunner for ClaudeRunner {
    fn meta(&self) -> RunnerMeta {
        RunnerMeta {
            id: "claude",
            display_name: "Claude Code",
            default_binary: "claude",
            capabilities: RunnerCapabilities {
                streaming: true,
                interrupt: true,
                file_context: false,
                subagent_tracing: true,
            },
            dialect: Dialect::Claude,
        }
    }

    fn setup_questions(&self) -> Vec<SetupQuestion> {
        vec![
            SetupQuestion::path("binary", "Path to the claude binary")
                .with_help("Leave empty to use `claude` from PATH"),
            SetupQuestion::text("model", "Default model")
                .with_help("e.g. sonnet, opus, or a full model id"),
            SetupQuestion::bool("dangerously_skip_permissions", "Skip permission prompts?")
                .with_default(json!(false))
                .with_help("Passes --dangerously-skip-permissions; only for sandboxed runs"),
        ]
    }

    fn validate_setup(&self, answers: &SetupAnswers) -> Option<String> {
        if let Some(model) = answers.get("model").and_then(serde_json::Value::as_str) {
            if model.trim().is_empty() {
                return Some("model must not be empty when set".to_string());
            }
        }
        None
    }

    fn build_args(&self, prompt: &str, _files: &[PathBuf], options: &ExecOptions) -> Vec<String> {
        // Non-interactive streaming mode: --print is always appended.
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
        ];
        if let Some(model) = options
            .model
            .as_deref()
            .or_else(|| options.answer_str("model"))
        {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        if options.answer_bool("dangerously_skip_permissions") {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.push(prompt.to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_appends_print_and_stream_json() {
        let args = ClaudeRunner.build_args("do the thing", &[], &ExecOptions::default());
        assert_eq!(args[0], "--print");
        assert!(args.contains(&"stream-json".to_string()));
        assert_eq!(args.last().unwrap(), "do the thing");
    }

    #[test]
    fn model_override_wins_over_answer() {
        let mut options = ExecOptions::default();
        options
            .answers
            .insert("model".into(), serde_json::json!("sonnet"));
        options.model = Some("opus".into());
        let args = ClaudeRunner.build_args("p", &[], &options);
        let i = args.iter().position(|a| a == "--model").unwrap();
        assert_eq!(args[i + 1], "opus");
    }

    #[test]
    fn skip_permissions_requires_opt_in() {
        let args = ClaudeRunner.build_args("p", &[], &ExecOptions::default());
        assert!(!args.iter().any(|a| a.contains("skip-permissions")));

        let mut options = ExecOptions::default();
        options
            .answers
            .insert("dangerously_skip_permissions".into(), serde_json::json!(true));
        let args = ClaudeRunner.build_args("p", &[], &options);
        assert!(args.contains(&"--dangerously-skip-permissions".to_string()));
    }

    #[test]
    fn empty_model_answer_fails_validation() {
        let mut answers = SetupAnswers::new();
        answers.insert("model".into(), serde_json::json!("  "));
        assert!(ClaudeRunner.validate_setup(&answers).is_some());
    }
}
