//! Built-in agent runners, one per vendor dialect.

mod claude;
mod droid;
mod opencode;

pub use claude::ClaudeRunner;
pub use droid::DroidRunner;
pub use opencode::OpenCodeRunner;
