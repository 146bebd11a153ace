//! The four pipeline tools exposed to the agent loop.
//!
//! Inputs and outputs are typed; the JSON forms (`{"ok": ..}` observations,
//! `Action Input` payloads) exist only at the language-model boundary.

pub mod dispatcher;

use crate::types::{ExternalTask, Prediction};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

pub use dispatcher::ToolDispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    CleanText,
    CheckDuplicate,
    PredictPipeline,
    CreateClickupTask,
}

impl ToolName {
    pub const ALL: [ToolName; 4] = [
        ToolName::CleanText,
        ToolName::CheckDuplicate,
        ToolName::PredictPipeline,
        ToolName::CreateClickupTask,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolName::CleanText => "clean_text",
            ToolName::CheckDuplicate => "check_duplicate",
            ToolName::PredictPipeline => "predict_pipeline",
            ToolName::CreateClickupTask => "create_clickup_task",
        }
    }

    pub fn definition(self) -> ToolDefinition {
        let ticket_schema = json!({
            "type": "object",
            "properties": {"subject": {"type": "string"}, "body": {"type": "string"}},
            "required": ["subject", "body"],
        });
        let (description, input_schema) = match self {
            ToolName::CleanText => (
                "Strips signatures, fixes common typos and normalises whitespace.",
                ticket_schema,
            ),
            ToolName::CheckDuplicate => (
                "Checks whether identical content was already submitted in the last 7 days.",
                ticket_schema,
            ),
            ToolName::PredictPipeline => (
                "Predicts priority, type, department and tags for the cleaned ticket.",
                ticket_schema,
            ),
            ToolName::CreateClickupTask => (
                "Creates the task and sets type, department and tags from the prediction.",
                json!({
                    "type": "object",
                    "properties": {
                        "subject": {"type": "string"},
                        "body": {"type": "string"},
                        "pred": {"type": "object"},
                    },
                    "required": ["subject", "body", "pred"],
                }),
            ),
        };
        ToolDefinition {
            name: self,
            description: description.to_string(),
            input_schema,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown tool '{}'", s))
    }
}

/// Prompt-facing description of one tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: ToolName,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn prompt_line(&self) -> String {
        format!("- {}: {} Input: {}", self.name, self.description, self.input_schema)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl TicketInput {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub pred: Prediction,
}

/// A fully-typed tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    CleanText(TicketInput),
    CheckDuplicate(TicketInput),
    PredictPipeline(TicketInput),
    CreateClickupTask(CreateTaskInput),
}

impl ToolCall {
    pub fn tool(&self) -> ToolName {
        match self {
            ToolCall::CleanText(_) => ToolName::CleanText,
            ToolCall::CheckDuplicate(_) => ToolName::CheckDuplicate,
            ToolCall::PredictPipeline(_) => ToolName::PredictPipeline,
            ToolCall::CreateClickupTask(_) => ToolName::CreateClickupTask,
        }
    }

    /// Types a JSON `Action Input` for `tool`.
    pub fn from_payload(tool: ToolName, payload: &Value) -> Result<Self, serde_json::Error> {
        Ok(match tool {
            ToolName::CleanText => ToolCall::CleanText(TicketInput::deserialize(payload)?),
            ToolName::CheckDuplicate => ToolCall::CheckDuplicate(TicketInput::deserialize(payload)?),
            ToolName::PredictPipeline => {
                ToolCall::PredictPipeline(TicketInput::deserialize(payload)?)
            }
            ToolName::CreateClickupTask => {
                ToolCall::CreateClickupTask(CreateTaskInput::deserialize(payload)?)
            }
        })
    }

    pub fn payload(&self) -> Value {
        let value = match self {
            ToolCall::CleanText(input)
            | ToolCall::CheckDuplicate(input)
            | ToolCall::PredictPipeline(input) => serde_json::to_value(input),
            ToolCall::CreateClickupTask(input) => serde_json::to_value(input),
        };
        value.unwrap_or(Value::Null)
    }
}

/// Successful tool results.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Cleaned { subject: String, body: String },
    NotDuplicate { dup_hash: String },
    Predicted(Prediction),
    Created { task: ExternalTask, notes: Vec<String> },
}

impl ToolOutput {
    /// The created task, when this output carries one.
    pub fn task(&self) -> Option<&ExternalTask> {
        match self {
            ToolOutput::Created { task, .. } => Some(task),
            _ => None,
        }
    }
}

/// A negative observation. Ends the agent loop verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub reason: String,
    pub dup_hash: Option<String>,
}

impl ToolFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            dup_hash: None,
        }
    }
}

pub type Observation = Result<ToolOutput, ToolFailure>;

/// Wire form of an observation, as shown to the model and returned to callers.
pub fn observation_json(observation: &Observation) -> Value {
    match observation {
        Ok(ToolOutput::Cleaned { subject, body }) => {
            json!({ "ok": true, "subject": subject, "body": body })
        }
        Ok(ToolOutput::NotDuplicate { dup_hash }) => {
            json!({ "ok": true, "duplicate": false, "dup_hash": dup_hash })
        }
        Ok(ToolOutput::Predicted(prediction)) => json!({ "ok": true, "pred": prediction }),
        Ok(ToolOutput::Created { task, notes }) => {
            let mut value = json!({ "ok": true, "task_id": task.id, "task_url": task.url });
            if !notes.is_empty() {
                value["notes"] = json!(notes);
            }
            value
        }
        Err(failure) => {
            let mut value = json!({ "ok": false, "reason": failure.reason });
            if let Some(hash) = &failure.dup_hash {
                value["dup_hash"] = json!(hash);
            }
            value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;

    #[test]
    fn tool_names_round_trip_through_strings() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert!("delete_everything".parse::<ToolName>().is_err());
    }

    #[test]
    fn create_payload_accepts_prediction_json() {
        let payload = json!({
            "subject": "VPN",
            "body": "drops",
            "pred": {"priority": "High", "type": "Incident", "department": "IT", "tags": ["Network"]}
        });
        let call = ToolCall::from_payload(ToolName::CreateClickupTask, &payload).unwrap();
        match call {
            ToolCall::CreateClickupTask(input) => {
                assert_eq!(input.pred.priority, Priority::High);
                assert_eq!(input.pred.ticket_type, "Incident");
                assert!(input.pred.tags.contains("Network"));
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn wire_forms_match_the_tool_contract() {
        let dup: Observation = Err(ToolFailure {
            reason: "duplicate_found".to_string(),
            dup_hash: Some("h".to_string()),
        });
        assert_eq!(
            observation_json(&dup),
            json!({"ok": false, "reason": "duplicate_found", "dup_hash": "h"})
        );

        let fresh: Observation = Ok(ToolOutput::NotDuplicate {
            dup_hash: "h".to_string(),
        });
        assert_eq!(
            observation_json(&fresh),
            json!({"ok": true, "duplicate": false, "dup_hash": "h"})
        );

        let pred: Observation = Ok(ToolOutput::Predicted(Prediction {
            priority: Priority::Low,
            ticket_type: "Request".to_string(),
            ..Prediction::default()
        }));
        let value = observation_json(&pred);
        assert_eq!(value["pred"]["type"], "Request");
        assert_eq!(value["pred"]["priority"], "Low");
        assert!(value["pred"].get("confidences").is_none());
    }
}
