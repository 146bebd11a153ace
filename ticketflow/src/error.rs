//! Error types for ticketflow.
//!
//! `TicketError` is the pipeline-level taxonomy. Every variant renders to the
//! stable reason string carried by a failed tool observation, so the agent
//! loop and the direct submission service report failures identically.

use crate::tracker::TrackerError;
use thiserror::Error;

pub type TicketResult<T> = Result<T, TicketError>;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Empty ticket: both subject and body are empty")]
    EmptyTicket,

    #[error("Duplicate ticket already submitted (hash {hash})")]
    DuplicateFound { hash: String },

    #[error("Prediction failed in task '{task}': {cause}")]
    PredictionFailed { task: String, cause: String },

    #[error("No matching option for '{requested}' on field {field}")]
    NoMatchingOption { field: String, requested: String },

    #[error("Field {field_id} is not usable: {reason}")]
    FieldUnavailable { field_id: String, reason: String },

    #[error("Failed to set field {field_id} after {attempts} endpoint/payload strategies{}", last_suffix(.last))]
    WriteExhausted {
        field_id: String,
        attempts: usize,
        last: Option<TrackerError>,
    },

    #[error("Field {field_id} write returned 2xx but value '{expected}' was not persisted within {waited_secs:.1}s")]
    NotPersisted {
        field_id: String,
        expected: String,
        waited_secs: f64,
    },

    #[error("Unexpected create_task return shape: {0}")]
    CreateShape(String),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Agent exhausted its step budget without a terminal observation")]
    AgentIncomplete,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serde(String),
}

fn last_suffix(last: &Option<TrackerError>) -> String {
    last.as_ref().map(|e| format!(": {}", e)).unwrap_or_default()
}

impl From<std::io::Error> for TicketError {
    fn from(e: std::io::Error) -> Self {
        TicketError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TicketError {
    fn from(e: serde_json::Error) -> Self {
        TicketError::Serde(e.to_string())
    }
}

impl TicketError {
    /// Wire reason for a failed observation. `stage` names the tracker step
    /// (`create_task`, `type_set`, ...) and is ignored for non-tracker errors.
    pub fn reason(&self, stage: &str) -> String {
        match self {
            TicketError::EmptyTicket => {
                "prediction_failed: Empty ticket after preprocessing".to_string()
            }
            TicketError::DuplicateFound { .. } => "duplicate_found".to_string(),
            TicketError::PredictionFailed { task, cause } => {
                format!("prediction_failed: {}: {}", task, cause)
            }
            TicketError::CreateShape(shape) => {
                format!("clickup_failed: create_task_return_shape: {}", shape)
            }
            TicketError::AgentIncomplete => "agent_incomplete".to_string(),
            other => format!("clickup_failed: {}: {}", stage, other),
        }
    }
}
