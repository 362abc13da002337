//! Typed setup questions
//!
//! Each plugin advertises an ordered list of prompts; the registry (and the
//! interactive setup command) validate user answers against them. Answers
//! are plain JSON values keyed by question id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionKind {
    Text,
    Bool,
    Select { choices: Vec<String> },
    Path,
    Number,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetupQuestion {
    pub id: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub required: bool,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl SetupQuestion {
    pub fn text(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            help: None,
            default: None,
            required: false,
            kind: QuestionKind::Text,
        }
    }

    pub fn bool(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind: QuestionKind::Bool,
            ..Self::text(id, prompt)
        }
    }

    pub fn path(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind: QuestionKind::Path,
            ..Self::text(id, prompt)
        }
    }

    pub fn number(id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            kind: QuestionKind::Number,
            ..Self::text(id, prompt)
        }
    }

    pub fn select(
        id: impl Into<String>,
        prompt: impl Into<String>,
        choices: Vec<String>,
    ) -> Self {
        Self {
            kind: QuestionKind::Select { choices },
            ..Self::text(id, prompt)
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn type_ok(&self, value: &Value) -> bool {
        match &self.kind {
            QuestionKind::Text | QuestionKind::Path => value.is_string(),
            QuestionKind::Bool => value.is_boolean(),
            QuestionKind::Number => value.is_number(),
            QuestionKind::Select { choices } => value
                .as_str()
                .map(|s| choices.iter().any(|c| c == s))
                .unwrap_or(false),
        }
    }
}

pub type SetupAnswers = HashMap<String, Value>;

/// Check answers against a plugin's questions. Returns human-readable
/// problems; empty means valid.
pub fn validate_answers(questions: &[SetupQuestion], answers: &SetupAnswers) -> Vec<String> {
    let mut errors = Vec::new();

    for q in questions {
        match answers.get(&q.id) {
            None => {
                if q.required && q.default.is_none() {
                    errors.push(format!("missing required answer: {}", q.id));
                }
            }
            Some(v) => {
                if !q.type_ok(v) {
                    errors.push(format!("answer '{}' has the wrong type", q.id));
                }
            }
        }
    }

    for key in answers.keys() {
        if !questions.iter().any(|q| &q.id == key) {
            errors.push(format!("unknown answer: {key}"));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn questions() -> Vec<SetupQuestion> {
        vec![
            SetupQuestion::path("binary", "Path to the CLI binary").required(),
            SetupQuestion::bool("auto_permissions", "Skip permission prompts?")
                .with_default(json!(false)),
            SetupQuestion::select(
                "effort",
                "Reasoning effort",
                vec!["low".into(), "medium".into(), "high".into()],
            ),
        ]
    }

    #[test]
    fn valid_answers_pass() {
        let answers: SetupAnswers = [
            ("binary".to_string(), json!("/usr/bin/droid")),
            ("effort".to_string(), json!("high")),
        ]
        .into();
        assert!(validate_answers(&questions(), &answers).is_empty());
    }

    #[test]
    fn missing_required_is_reported() {
        let answers = SetupAnswers::new();
        let errors = validate_answers(&questions(), &answers);
        assert_eq!(errors, vec!["missing required answer: binary"]);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let answers: SetupAnswers = [
            ("binary".to_string(), json!("/ok")),
            ("auto_permissions".to_string(), json!("yes")),
        ]
        .into();
        let errors = validate_answers(&questions(), &answers);
        assert_eq!(errors, vec!["answer 'auto_permissions' has the wrong type"]);
    }

    #[test]
    fn select_rejects_unknown_choice() {
        let answers: SetupAnswers = [
            ("binary".to_string(), json!("/ok")),
            ("effort".to_string(), json!("turbo")),
        ]
        .into();
        assert!(!validate_answers(&questions(), &answers).is_empty());
    }

    #[test]
    fn unknown_answer_is_reported() {
        let answers: SetupAnswers = [
            ("binary".to_string(), json!("/ok")),
            ("mystery".to_string(), json!(1)),
        ]
        .into();
        let errors = validate_answers(&questions(), &answers);
        assert_eq!(errors, vec!["unknown answer: mystery"]);
    }
}
