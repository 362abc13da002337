//! Agent runner plugin contract
//!
//! A runner knows how to turn a prompt into argv for one vendor CLI and
//! launch it. The framework supplies the process wrapper; concrete runners
//! only provide metadata, setup questions, and arg building.

use std::path::PathBuf;
use std::time::Duration;

use ralph_core::Result;
use ralph_parser::Dialect;

use crate::process;
use crate::setup::{SetupAnswers, SetupQuestion};

/// What a runner can do. The engine consults these before relying on a
/// behavior (e.g. interrupt on rate limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerCapabilities {
    pub streaming: bool,
    pub interrupt: bool,
    pub file_context: bool,
    pub subagent_tracing: bool,
}

#[derive(Debug, Clone)]
pub struct RunnerMeta {
    pub id: &'static str,
    pub display_name: &'static str,
    pub default_binary: &'static str,
    pub capabilities: RunnerCapabilities,
    pub dialect: Dialect,
}

/// Per-execution options, assembled by the engine from config + run flags.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub cwd: PathBuf,
    pub model: Option<String>,
    pub reasoning_effort: Option<String>,
    /// Binary override; falls back to the runner's `default_binary`.
    pub binary: Option<String>,
    /// Setup answers for this runner, keyed by question id.
    pub answers: SetupAnswers,
    /// Context files for runners that advertise `file_context`.
    pub files: Vec<PathBuf>,
}

impl ExecOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    pub fn answer_bool(&self, id: &str) -> bool {
        self.answers
            .get(id)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn answer_str(&self, id: &str) -> Option<&str> {
        self.answers.get(id).and_then(serde_json::Value::as_str)
    }
}

/// Byte pipe from the child process. One each for stdout and stderr.
pub type OutputPipe = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// A running child. The engine owns exactly one at a time per session.
#[async_trait::async_trait]
pub trait AgentHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Take the stdout pipe (once).
    fn take_stdout(&mut self) -> Option<OutputPipe>;

    /// Take the stderr pipe (once).
    fn take_stderr(&mut self) -> Option<OutputPipe>;

    /// Graceful: SIGINT, wait up to `grace`, escalate to SIGKILL.
    /// Returns the exit code (-1 when the child died to a signal).
    async fn interrupt(&mut self, grace: Duration) -> Result<i32>;

    /// Immediate SIGKILL.
    async fn kill(&mut self) -> Result<()>;

    /// Wait for natural exit.
    async fn wait(&mut self) -> Result<i32>;
}

/// The runner plugin contract. Implementations are pure subprocess wrappers;
/// they do not interpret output.
#[async_trait::async_trait]
pub trait AgentRunner: Send + Sync {
    fn meta(&self) -> RunnerMeta;

    /// Ordered prompts for interactive configuration.
    fn setup_questions(&self) -> Vec<SetupQuestion> {
        Vec::new()
    }

    /// Plugin-specific validation beyond the per-question type checks.
    fn validate_setup(&self, _answers: &SetupAnswers) -> Option<String> {
        None
    }

    /// Argv for the child process (binary name excluded).
    fn build_args(&self, prompt: &str, files: &[PathBuf], options: &ExecOptions) -> Vec<String>;

    /// Launch the vendor CLI. The default implementation is the framework's
    /// process wrapper; runners normally don't override it.
    async fn execute(&self, prompt: &str, options: &ExecOptions) -> Result<Box<dyn AgentHandle>> {
        let args = self.build_args(prompt, &options.files, options);
        let binary = options
            .binary
            .clone()
            .or_else(|| self.answer_binary(options))
            .unwrap_or_else(|| self.meta().default_binary.to_string());
        let handle = process::launch(&binary, &args, &options.cwd).await?;
        Ok(Box::new(handle))
    }

    /// The `binary` setup answer, when the plugin defines one.
    fn answer_binary(&self, options: &ExecOptions) -> Option<String> {
        options.answer_str("binary").map(str::to_string)
    }
}
