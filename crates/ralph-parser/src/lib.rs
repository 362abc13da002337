//! Ralph Parser - structured-output stream parsing
//!
//! Consumes arbitrary byte chunks from an agent child process and turns them
//! into typed events: plain lines, normalized structured events from one of
//! three vendor dialects, and parse errors. Also reconstructs the subagent
//! tree and runs the terminal-signal detectors.

pub mod ansi;
pub mod detect;
pub mod dialect;
pub mod event;
pub mod framing;
pub mod parser;
pub mod tree;

pub use ansi::strip_ansi;
pub use detect::{
    CompletionDetector, FatalDetector, RateLimitDetector, RateLimitPatterns, SignalScanner,
    COMPLETION_SENTINEL,
};
pub use dialect::Dialect;
pub use event::{EventKind, ParsedEvent, StructuredEvent};
pub use framing::LineFramer;
pub use parser::StreamParser;
pub use tree::{SubagentTree, TreeDelta};
