//! Ralph Plugins - agent runners and task trackers
//!
//! Runners are pure subprocess wrappers around vendor CLIs: they build argv,
//! launch the child, and hand the engine a handle. They never interpret
//! output - the engine attaches the dialect-matched stream parser. Trackers
//! are the system of record for tasks; the engine reads and writes through
//! them and nothing else.

pub mod process;
pub mod registry;
pub mod runner;
pub mod runners;
pub mod setup;
pub mod tracker;
pub mod trackers;

pub use process::ProcessHandle;
pub use registry::PluginRegistry;
pub use runner::{AgentHandle, AgentRunner, ExecOptions, OutputPipe, RunnerCapabilities, RunnerMeta};
pub use runners::{ClaudeRunner, DroidRunner, OpenCodeRunner};
pub use setup::{validate_answers, QuestionKind, SetupAnswers, SetupQuestion};
pub use tracker::{Tracker, TrackerMeta};
pub use trackers::{JsonFileTracker, MarkdownTracker};
