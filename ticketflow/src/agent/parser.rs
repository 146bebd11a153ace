//! Grammar for one model turn.
//!
//! ```text
//! turn      := preamble? thought? action input tail?
//! thought   := "Thought:" text
//! action    := "Action:" identifier
//! input     := "Action Input:" json-object
//! tail      := any further sections (ignored)
//! ```
//!
//! Section labels are matched case-insensitively at the start of a line.
//! Markdown code fences are removed before tokenising.

use crate::tools::ToolName;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```[ \t]*(?:json)?").expect("fence pattern is valid"));

/// A well-formed action proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub tool: ToolName,
    pub payload: Value,
    pub thought: String,
}

/// Why a model turn could not be parsed. Recovered by re-prompting or by the
/// fallback controller; never surfaced to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("parse_error: empty response")]
    Empty,
    #[error("parse_error: final answer given before any action")]
    PrematureFinalAnswer,
    #[error("parse_error: missing 'Action'")]
    MissingAction,
    #[error("parse_error: missing 'Action Input' after 'Action'")]
    MissingActionInput,
    #[error("parse_error: action '{0}' is not a tool identifier")]
    MalformedToolName(String),
    #[error("invalid_tool: {0}")]
    ToolNotAllowed(String),
    #[error("invalid_json_for_action_input: {0}")]
    InvalidJson(String),
    #[error("invalid_json_for_action_input: expected an object, got {0}")]
    NotAnObject(&'static str),
    #[error("parse_error: unexpected text after action input: {0}")]
    TrailingText(String),
    #[error("model_unavailable: {0}")]
    ModelUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Preamble,
    Thought,
    Action,
    ActionInput,
    Observation,
    FinalAnswer,
}

/// Order matters: "Action Input" must be tried before its prefix "Action".
const LABELS: &[(&str, Label)] = &[
    ("thought:", Label::Thought),
    ("action input:", Label::ActionInput),
    ("action:", Label::Action),
    ("observation:", Label::Observation),
    ("final answer:", Label::FinalAnswer),
];

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    label: Label,
    body: String,
}

/// Splits text into labelled sections. Lines without a label continue the
/// current section.
fn tokenize(text: &str) -> Vec<Section> {
    let mut sections = vec![Section {
        label: Label::Preamble,
        body: String::new(),
    }];

    for line in text.lines() {
        let trimmed = line.trim_start();
        let lowered = trimmed.to_ascii_lowercase();
        let labelled = LABELS
            .iter()
            .find(|(prefix, _)| lowered.starts_with(prefix))
            .map(|(prefix, label)| (*label, &trimmed[prefix.len()..]));

        match labelled {
            Some((label, rest)) => sections.push(Section {
                label,
                body: rest.trim().to_string(),
            }),
            None => {
                if let Some(current) = sections.last_mut() {
                    if !current.body.is_empty() {
                        current.body.push('\n');
                    }
                    current.body.push_str(line);
                }
            }
        }
    }
    sections
}

struct Cursor<'a> {
    sections: &'a [Section],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&'a Section> {
        self.sections.get(self.pos)
    }

    fn accept(&mut self, label: Label) -> Option<&'a Section> {
        match self.peek() {
            Some(section) if section.label == label => {
                self.pos += 1;
                Some(section)
            }
            _ => None,
        }
    }
}

pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").into_owned()
}

/// Parses one model turn, accepting only tools in `allowed`.
pub fn parse_action(text: &str, allowed: &[ToolName]) -> Result<Parsed, ParseFailure> {
    let cleaned = strip_code_fences(text);
    if cleaned.trim().is_empty() {
        return Err(ParseFailure::Empty);
    }
    let sections = tokenize(&cleaned);
    let mut cursor = Cursor {
        sections: &sections,
        pos: 0,
    };

    cursor.accept(Label::Preamble);
    let thought = parse_thought(&mut cursor);
    let tool = parse_tool(&mut cursor, allowed)?;
    let payload = parse_input(&mut cursor)?;

    Ok(Parsed {
        tool,
        payload,
        thought,
    })
}

fn parse_thought(cursor: &mut Cursor<'_>) -> String {
    cursor
        .accept(Label::Thought)
        .map(|s| s.body.trim().to_string())
        .unwrap_or_default()
}

fn parse_tool(cursor: &mut Cursor<'_>, allowed: &[ToolName]) -> Result<ToolName, ParseFailure> {
    let section = match cursor.peek() {
        Some(s) if s.label == Label::Action => s,
        Some(s) if s.label == Label::FinalAnswer => return Err(ParseFailure::PrematureFinalAnswer),
        _ => return Err(ParseFailure::MissingAction),
    };
    cursor.pos += 1;

    let name = section.body.trim().trim_matches('`').trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ParseFailure::MalformedToolName(name.to_string()));
    }
    name.parse::<ToolName>()
        .ok()
        .filter(|tool| allowed.contains(tool))
        .ok_or_else(|| ParseFailure::ToolNotAllowed(name.to_string()))
}

fn parse_input(cursor: &mut Cursor<'_>) -> Result<Value, ParseFailure> {
    let section = cursor
        .accept(Label::ActionInput)
        .ok_or(ParseFailure::MissingActionInput)?;

    let mut values = serde_json::Deserializer::from_str(&section.body).into_iter::<Value>();
    let payload = match values.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(ParseFailure::InvalidJson(e.to_string())),
        None => return Err(ParseFailure::InvalidJson("no JSON value".to_string())),
    };
    let rest = section.body[values.byte_offset()..].trim();
    if !rest.is_empty() {
        let preview: String = rest.chars().take(40).collect();
        return Err(ParseFailure::TrailingText(preview));
    }

    match payload {
        Value::Object(_) => Ok(payload),
        Value::Array(_) => Err(ParseFailure::NotAnObject("array")),
        Value::String(_) => Err(ParseFailure::NotAnObject("string")),
        Value::Number(_) => Err(ParseFailure::NotAnObject("number")),
        Value::Bool(_) => Err(ParseFailure::NotAnObject("bool")),
        Value::Null => Err(ParseFailure::NotAnObject("null")),
    }
}
