//! The stream parser - push chunks in, pull events out
//!
//! Callers drive it from the read loop: `push` raw bytes as they arrive,
//! drain with `next_event`, and `finish` at end-of-stream to flush the
//! trailing partial line. A malformed line surfaces as `ParseError` and
//! parsing resumes at the next newline. Replaying the same bytes through a
//! fresh parser yields the same event sequence.

use std::collections::VecDeque;

use serde_json::Value;

use crate::ansi::strip_ansi;
use crate::dialect::Dialect;
use crate::event::ParsedEvent;
use crate::framing::LineFramer;

pub struct StreamParser {
    dialect: Dialect,
    framer: LineFramer,
    queue: VecDeque<ParsedEvent>,
}

impl StreamParser {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            framer: LineFramer::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Feed a byte chunk. Chunk boundaries are arbitrary; events only become
    /// available once their terminating newline has been observed.
    pub fn push(&mut self, chunk: &[u8]) {
        for line in self.framer.push(chunk) {
            self.ingest_line(&line);
        }
    }

    /// End-of-stream: flush the remaining buffer as a final line iff it is
    /// non-empty after trim.
    pub fn finish(&mut self) {
        if let Some(line) = self.framer.finish() {
            self.ingest_line(&line);
        }
    }

    pub fn next_event(&mut self) -> Option<ParsedEvent> {
        self.queue.pop_front()
    }

    pub fn drain(&mut self) -> Vec<ParsedEvent> {
        self.queue.drain(..).collect()
    }

    fn ingest_line(&mut self, raw: &str) {
        let clean = strip_ansi(raw);
        let trimmed = clean.trim();
        if trimmed.is_empty() {
            return;
        }

        // Leading garbage before the first '{' is discarded; a line with no
        // '{' at all is plain text.
        let Some(start) = trimmed.find('{') else {
            self.queue.push_back(ParsedEvent::line(trimmed));
            return;
        };

        let mut values = serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        match values.next() {
            Some(Ok(value)) => {
                for ev in self.dialect.decode(&value) {
                    self.queue.push_back(ParsedEvent::Structured(ev));
                }
            }
            Some(Err(e)) => {
                self.queue.push_back(ParsedEvent::ParseError {
                    raw: trimmed.to_string(),
                    reason: e.to_string(),
                });
            }
            None => {
                self.queue.push_back(ParsedEvent::ParseError {
                    raw: trimmed.to_string(),
                    reason: "no value".to_string(),
                });
            }
        }
    }
}
