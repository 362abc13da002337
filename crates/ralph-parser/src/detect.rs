//! Terminal-signal detectors
//!
//! Three independent classifiers run over every parsed event: completion
//! sentinel, rate limiting, and fatal errors. They are built to be
//! false-positive safe: the rate-limit detector only fires when the phrase
//! opens a line, appears inside a structured error event, or is accompanied
//! by a numeric retry hint, so source code that merely mentions "rate limit"
//! does not stop an iteration.

use regex::Regex;

use ralph_core::signal::{FatalKind, Signal};

use crate::event::{EventKind, ParsedEvent, StructuredEvent};

/// The literal the agent emits to claim completion. Case-sensitive.
pub const COMPLETION_SENTINEL: &str = "<promise>COMPLETE</promise>";

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Watches the concatenated text of the iteration for the sentinel. Keeps a
/// small rolling tail so a sentinel split across two chunks still matches.
#[derive(Debug, Default)]
pub struct CompletionDetector {
    tail: String,
    fired: bool,
}

impl CompletionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fired(&self) -> bool {
        self.fired
    }

    /// Feed a piece of iteration text; true once the sentinel has been seen.
    pub fn feed(&mut self, text: &str) -> bool {
        if self.fired {
            return true;
        }
        let mut hay = std::mem::take(&mut self.tail);
        hay.push_str(text);
        if hay.contains(COMPLETION_SENTINEL) {
            self.fired = true;
            return true;
        }
        // Keep just enough to catch a sentinel straddling the boundary.
        let keep = COMPLETION_SENTINEL.len() - 1;
        if hay.len() > keep {
            let cut = hay
                .char_indices()
                .rev()
                .take(keep)
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
            hay.drain(..cut);
        }
        self.tail = hay;
        false
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// One vendor's worth of rate-limit phrases.
#[derive(Debug, Clone)]
pub struct RateLimitPatterns {
    pub vendor: String,
    pub phrases: Vec<String>,
}

pub struct RateLimitDetector {
    groups: Vec<RateLimitPatterns>,
    http_429: Regex,
    delay_rules: Vec<(Regex, u64)>,
}

impl Default for RateLimitDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitDetector {
    pub fn new() -> Self {
        let groups = vec![
            RateLimitPatterns {
                vendor: "anthropic".into(),
                phrases: vec![
                    "rate limit".into(),
                    "rate-limited".into(),
                    "overloaded_error".into(),
                ],
            },
            RateLimitPatterns {
                vendor: "openai".into(),
                phrases: vec!["rate limit".into(), "insufficient_quota".into()],
            },
            RateLimitPatterns {
                vendor: "generic".into(),
                phrases: vec![
                    "quota exceeded".into(),
                    "too many requests".into(),
                    "usage limit reached".into(),
                ],
            },
        ];
        Self {
            groups,
            http_429: Regex::new(r"(?i)(?:status(?: code)?[: ]+429\b|\b429 too many requests)")
                .expect("static regex"),
            delay_rules: vec![
                // "retry after 30 seconds", "Retry-After: 30"
                (
                    Regex::new(r"(?i)retry[- ]?after[:= ]*(\d+)").expect("static regex"),
                    1,
                ),
                // "try again in 5m" / "try again in 2 minutes"
                (
                    Regex::new(r"(?i)try again in (\d+)\s*m(?:in(?:ute)?s?)?\b").expect("static regex"),
                    60,
                ),
                // "try again in 90s" / "try again in 90 seconds"
                (
                    Regex::new(r"(?i)try again in (\d+)\s*s(?:ec(?:ond)?s?)?\b").expect("static regex"),
                    1,
                ),
            ],
        }
    }

    /// Add a vendor-specific pattern group on top of the defaults.
    pub fn with_patterns(mut self, extra: RateLimitPatterns) -> Self {
        self.groups.push(extra);
        self
    }

    /// Extract a retry hint in seconds from common phrasings.
    pub fn extract_delay(&self, text: &str) -> Option<u64> {
        for (re, multiplier) in &self.delay_rules {
            if let Some(caps) = re.captures(text) {
                if let Ok(n) = caps[1].parse::<u64>() {
                    return Some(n * multiplier);
                }
            }
        }
        None
    }

    fn phrase_hit(&self, lowered: &str) -> bool {
        self.groups
            .iter()
            .flat_map(|g| g.phrases.iter())
            .any(|p| lowered.contains(p.as_str()))
    }

    /// Classify a plain output line.
    pub fn check_line(&self, line: &str) -> Option<Signal> {
        let trimmed = line.trim_start();
        let lowered = trimmed.to_lowercase();
        let delay = self.extract_delay(trimmed);

        // The phrase must open the line (allowing an error prefix), unless a
        // retry hint or 429 marker pins it down as a real limiter message.
        let head = lowered
            .strip_prefix("error:")
            .or_else(|| lowered.strip_prefix("fatal:"))
            .or_else(|| lowered.strip_prefix("warning:"))
            .unwrap_or(&lowered)
            .trim_start();

        let anchored = self
            .groups
            .iter()
            .flat_map(|g| g.phrases.iter())
            .any(|p| head.starts_with(p.as_str()));

        let matched = anchored
            || (self.phrase_hit(&lowered) && delay.is_some())
            || self.http_429.is_match(trimmed);

        if matched {
            Some(Signal::RateLimited {
                retry_after_secs: delay,
            })
        } else {
            None
        }
    }

    /// Classify a structured event. Inside an error-flagged event the phrase
    /// may appear anywhere.
    pub fn check_event(&self, ev: &StructuredEvent) -> Option<Signal> {
        let body = match (&ev.text, &ev.output) {
            (Some(t), _) => t.as_str(),
            (None, Some(o)) => o.as_str(),
            _ => return None,
        };
        let is_error = ev.is_error || ev.status.as_deref() == Some("error");
        if is_error {
            let lowered = body.to_lowercase();
            if self.phrase_hit(&lowered) || self.http_429.is_match(body) {
                return Some(Signal::RateLimited {
                    retry_after_secs: self.extract_delay(body),
                });
            }
            return None;
        }
        // Non-error events get the same anchoring rules as plain lines,
        // applied per line of the body.
        body.lines().find_map(|l| self.check_line(l))
    }
}

// ---------------------------------------------------------------------------
// Fatal errors
// ---------------------------------------------------------------------------

pub struct FatalDetector {
    auth_phrases: Vec<&'static str>,
}

impl Default for FatalDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FatalDetector {
    pub fn new() -> Self {
        Self {
            auth_phrases: vec![
                "authentication failed",
                "authentication_error",
                "invalid api key",
                "api key not found",
                "not logged in",
                "please run /login",
                "credentials have expired",
            ],
        }
    }

    pub fn check_line(&self, line: &str) -> Option<Signal> {
        let lowered = line.trim_start().to_lowercase();
        let is_error_line = lowered.starts_with("error") || lowered.starts_with("fatal");
        let head = lowered
            .strip_prefix("error:")
            .or_else(|| lowered.strip_prefix("fatal:"))
            .unwrap_or(&lowered)
            .trim_start();
        for phrase in &self.auth_phrases {
            if head.starts_with(phrase) || (is_error_line && lowered.contains(phrase)) {
                return Some(Signal::Fatal {
                    kind: FatalKind::Auth,
                    message: line.trim().to_string(),
                });
            }
        }
        None
    }

    pub fn check_event(&self, ev: &StructuredEvent) -> Option<Signal> {
        let body = ev.output.as_deref().or(ev.text.as_deref()).unwrap_or("");
        let lowered = body.to_lowercase();
        for phrase in &self.auth_phrases {
            if lowered.contains(phrase) {
                return Some(Signal::Fatal {
                    kind: FatalKind::Auth,
                    message: body.chars().take(200).collect(),
                });
            }
        }
        // Explicit is_error on a tool_result is fatal by contract.
        if ev.kind == EventKind::Result && ev.is_error {
            return Some(Signal::Fatal {
                kind: FatalKind::ToolError,
                message: ev
                    .output
                    .clone()
                    .unwrap_or_else(|| "tool reported an error".to_string()),
            });
        }
        None
    }

    /// Exit codes that indicate the binary itself is broken or missing.
    pub fn check_exit_code(&self, code: i32) -> Option<Signal> {
        if code == 127 {
            Some(Signal::Fatal {
                kind: FatalKind::MissingBinary,
                message: "command not found (exit 127)".to_string(),
            })
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Combined scanner
// ---------------------------------------------------------------------------

/// Runs all three detectors over an event stream. The first terminal signal
/// in stream order wins; later signals for the same iteration are ignored.
pub struct SignalScanner {
    completion: CompletionDetector,
    rate: RateLimitDetector,
    fatal: FatalDetector,
    fired: Option<Signal>,
}

impl Default for SignalScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalScanner {
    pub fn new() -> Self {
        Self {
            completion: CompletionDetector::new(),
            rate: RateLimitDetector::new(),
            fatal: FatalDetector::new(),
            fired: None,
        }
    }

    pub fn signal(&self) -> Option<&Signal> {
        self.fired.as_ref()
    }

    pub fn check_exit_code(&mut self, code: i32) -> Option<Signal> {
        if self.fired.is_some() {
            return None;
        }
        let sig = self.fatal.check_exit_code(code)?;
        self.fired = Some(sig.clone());
        Some(sig)
    }

    /// Scan one parsed event; returns the winning signal the first time one
    /// fires, None afterwards.
    pub fn scan(&mut self, ev: &ParsedEvent) -> Option<Signal> {
        if self.fired.is_some() {
            return None;
        }
        let sig = match ev {
            ParsedEvent::Line { text } => {
                if self.completion.feed(text) {
                    Some(Signal::Completion)
                } else {
                    self.fatal
                        .check_line(text)
                        .or_else(|| self.rate.check_line(text))
                }
            }
            ParsedEvent::Structured(se) => {
                let mut completed = false;
                if let Some(t) = &se.text {
                    completed |= self.completion.feed(t);
                }
                if let Some(o) = &se.output {
                    completed |= self.completion.feed(o);
                }
                if completed {
                    Some(Signal::Completion)
                } else {
                    self.fatal
                        .check_event(se)
                        .or_else(|| self.rate.check_event(se))
                }
            }
            ParsedEvent::ParseError { .. } => None,
        };
        if let Some(sig) = sig {
            self.fired = Some(sig.clone());
            return Some(sig);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_fires_once() {
        let mut d = CompletionDetector::new();
        assert!(!d.feed("working..."));
        assert!(d.feed("done <promise>COMPLETE</promise>"));
        assert!(d.fired());
    }

    #[test]
    fn sentinel_split_across_chunks() {
        let mut d = CompletionDetector::new();
        assert!(!d.feed("stuff <promise>COMP"));
        assert!(d.feed("LETE</promise> trailing"));
    }

    #[test]
    fn sentinel_is_case_sensitive() {
        let mut d = CompletionDetector::new();
        assert!(!d.feed("<promise>complete</promise>"));
    }

    #[test]
    fn rate_limit_at_line_start_fires() {
        let d = RateLimitDetector::new();
        assert!(d.check_line("Rate limit exceeded").is_some());
        assert!(d.check_line("Error: rate limit exceeded").is_some());
    }

    #[test]
    fn rate_limit_in_source_code_does_not_fire() {
        let d = RateLimitDetector::new();
        assert!(d
            .check_line("    // this function enforces the rate limit policy")
            .is_none());
        assert!(d
            .check_line("see docs about rate limit handling")
            .is_none());
    }

    #[test]
    fn rate_limit_with_retry_hint_fires_anywhere() {
        let d = RateLimitDetector::new();
        let sig = d
            .check_line("server said rate limit hit, retry after 30 seconds")
            .unwrap();
        assert_eq!(
            sig,
            Signal::RateLimited {
                retry_after_secs: Some(30)
            }
        );
    }

    #[test]
    fn delay_extraction_variants() {
        let d = RateLimitDetector::new();
        assert_eq!(d.extract_delay("Retry after 2 seconds."), Some(2));
        assert_eq!(d.extract_delay("retry-after: 45"), Some(45));
        assert_eq!(d.extract_delay("please try again in 5m"), Some(300));
        assert_eq!(d.extract_delay("try again in 90 seconds"), Some(90));
        assert_eq!(d.extract_delay("no numbers here"), None);
    }

    #[test]
    fn http_429_indicator_fires() {
        let d = RateLimitDetector::new();
        assert!(d.check_line("request failed with status 429 Too Many Requests").is_some());
    }

    #[test]
    fn structured_error_event_matches_anywhere() {
        let d = RateLimitDetector::new();
        let mut ev = StructuredEvent::result("c1");
        ev.is_error = true;
        ev.output = Some("upstream replied: quota exceeded for the month".into());
        assert!(d.check_event(&ev).is_some());
    }

    #[test]
    fn structured_benign_event_keeps_anchoring() {
        let d = RateLimitDetector::new();
        let mut ev = StructuredEvent::text("reading rate limit docs for the client");
        ev.is_error = false;
        assert!(d.check_event(&ev).is_none());
    }

    #[test]
    fn auth_failure_line_is_fatal() {
        let f = FatalDetector::new();
        match f.check_line("Error: authentication failed for account") {
            Some(Signal::Fatal { kind, .. }) => assert_eq!(kind, FatalKind::Auth),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn error_tool_result_is_fatal() {
        let f = FatalDetector::new();
        let mut ev = StructuredEvent::result("c1");
        ev.is_error = true;
        ev.output = Some("segfault".into());
        match f.check_event(&ev) {
            Some(Signal::Fatal { kind, .. }) => assert_eq!(kind, FatalKind::ToolError),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exit_127_means_missing_binary() {
        let f = FatalDetector::new();
        match f.check_exit_code(127) {
            Some(Signal::Fatal { kind, .. }) => assert_eq!(kind, FatalKind::MissingBinary),
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.check_exit_code(1).is_none());
    }

    #[test]
    fn scanner_first_signal_wins() {
        let mut s = SignalScanner::new();
        let first = s.scan(&ParsedEvent::line("rate limit exceeded, retry after 2 seconds"));
        assert!(matches!(first, Some(Signal::RateLimited { .. })));
        // A later completion does not displace the winner.
        assert!(s.scan(&ParsedEvent::line(COMPLETION_SENTINEL)).is_none());
        assert!(matches!(s.signal(), Some(Signal::RateLimited { .. })));
    }

    #[test]
    fn scanner_completion_through_structured_text() {
        let mut s = SignalScanner::new();
        let ev = ParsedEvent::Structured(StructuredEvent::text(format!(
            "all done {COMPLETION_SENTINEL}"
        )));
        assert_eq!(s.scan(&ev), Some(Signal::Completion));
    }

    #[test]
    fn parse_errors_never_signal() {
        let mut s = SignalScanner::new();
        let ev = ParsedEvent::ParseError {
            raw: "rate limit".into(),
            reason: "bad json".into(),
        };
        assert!(s.scan(&ev).is_none());
    }
}
