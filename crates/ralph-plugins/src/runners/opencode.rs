//! OpenCode runner (Dialect B)

use std::path::PathBuf;

use ralph_parser::Dialect;

use crate::runner::{AgentRunner, ExecOptions, RunnerCapabilities, RunnerMeta};
use crate::setup::SetupQuestion;

pub struct OpenCodeRunner;

#[async_trait::async_trait]
impl AgentRunner for OpenCodeRunner {
    fn meta(&self) -> RunnerMeta {
        RunnerMeta {
            id: "opencode",
            display_name: "OpenCode",
            default_binary: "opencode",
            capabilities: RunnerCapabilities {
                streaming: true,
                interrupt: true,
                file_context: true,
                subagent_tracing: true,
            },
            dialect: Dialect::OpenCode,
        }
    }

    fn setup_questions(&self) -> Vec<SetupQuestion> {
        vec![
            SetupQuestion::path("binary", "Path to the opencode binary"),
            SetupQuestion::text("model", "Default model")
                .with_help("provider/model form, e.g. anthropic/claude-sonnet-4"),
        ]
    }

    fn build_args(&self, prompt: &str, files: &[PathBuf], options: &ExecOptions) -> Vec<String> {
        // The run subcommand is prepended for non-interactive use.
        let mut args = vec![
            "run".to_string(),
            "--print-logs".to_string(),
            "--format".to_string(),
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
        for file in files {
            args.push("--file".to_string());
            args.push(file.display().to_string());
        }
        args.push(prompt.to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_run_subcommand() {
        let args = OpenCodeRunner.build_args("fix it", &[], &ExecOptions::default());
        assert_eq!(args[0], "run");
        assert_eq!(args.last().unwrap(), "fix it");
    }

    #[test]
    fn context_files_become_file_flags() {
        let files = vec![PathBuf::from("PRD.md"), PathBuf::from("notes.txt")];
        let args = OpenCodeRunner.build_args("p", &files, &ExecOptions::default());
        let positions: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "--file")
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 2);
        assert_eq!(args[positions[0] + 1], "PRD.md");
    }
}
