//! Droid runner (Dialect C)

use std::path::PathBuf;

use serde_json::json;

use ralph_parser::Dialect;

use crate::runner::{AgentRunner, ExecOptions, RunnerCapabilities, RunnerMeta};
use crate::setup::{SetupAnswers, SetupQuestion};

pub struct DroidRunner;

#[async_trait::async_trait]
impl AgentRunner for DroidRunner {
    fn meta(&self) -> RunnerMeta {
        RunnerMeta {
            id: "droid",
            display_name: "Factory Droid",
            default_binary: "droid",
            capabilities: RunnerCapabilities {
                streaming: true,
                interrupt: true,
                file_context: false,
                subagent_tracing: false,
            },
            dialect: Dialect::Droid,
        }
    }

    fn setup_questions(&self) -> Vec<SetupQuestion> {
        vec![
            SetupQuestion::path("binary", "Path to the droid binary"),
            SetupQuestion::text("model", "Default model"),
            SetupQuestion::select(
                "reasoning_effort",
                "Reasoning effort",
                vec!["low".into(), "medium".into(), "high".into()],
            ),
            SetupQuestion::bool("auto_permissions", "Run without permission prompts?")
                .with_default(json!(false))
                .with_help("Passes --skip-permissions-unsafe; the flag name means it"),
        ]
    }

    fn validate_setup(&self, answers: &SetupAnswers) -> Option<String> {
        match answers.get("auto_permissions") {
            Some(v) if !v.is_boolean() => {
                Some("auto_permissions must be true or false".to_string())
            }
            _ => None,
        }
    }

    fn build_args(&self, prompt: &str, _files: &[PathBuf], options: &ExecOptions) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if let Some(model) = options
            .model
            .as_deref()
            .or_else(|| options.answer_str("model"))
        {
            args.push("--model".to_string());
            args.push(model.to_string());
        }
        if let Some(effort) = options
            .reasoning_effort
            .as_deref()
            .or_else(|| options.answer_str("reasoning_effort"))
        {
            args.push("--reasoning-effort".to_string());
            args.push(effort.to_string());
        }
        if options.answer_bool("auto_permissions") {
            args.push("--skip-permissions-unsafe".to_string());
        }
        args.push(prompt.to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_exec_subcommand() {
        let args = DroidRunner.build_args("p", &[], &ExecOptions::default());
        assert_eq!(args[0], "exec");
    }

    #[test]
    fn unsafe_flag_only_on_opt_in() {
        let mut options = ExecOptions::default();
        let args = DroidRunner.build_args("p", &[], &options);
        assert!(!args.contains(&"--skip-permissions-unsafe".to_string()));

        options
            .answers
            .insert("auto_permissions".into(), json!(true));
        let args = DroidRunner.build_args("p", &[], &options);
        assert!(args.contains(&"--skip-permissions-unsafe".to_string()));
    }

    #[test]
    fn reasoning_effort_flows_through() {
        let mut options = ExecOptions::default();
        options.reasoning_effort = Some("high".into());
        let args = DroidRunner.build_args("p", &[], &options);
        let i = args.iter().position(|a| a == "--reasoning-effort").unwrap();
        assert_eq!(args[i + 1], "high");
    }

    #[test]
    fn non_bool_auto_permissions_rejected() {
        let mut answers = SetupAnswers::new();
        answers.insert("auto_permissions".into(), json!("yes"));
        assert!(DroidRunner.validate_setup(&answers).is_some());
    }
}
