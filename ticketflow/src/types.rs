//! Core data model shared by the pipeline components.

use crate::error::{TicketError, TicketResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// A support ticket accepted at intake. The id is assigned once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    id: String,
    pub subject: String,
    pub body: String,
}

impl Ticket {
    /// Trims both parts and rejects the ticket when nothing is left.
    pub fn new(subject: &str, body: &str) -> TicketResult<Self> {
        let subject = subject.trim();
        let body = body.trim();
        if subject.is_empty() && body.is_empty() {
            return Err(TicketError::EmptyTicket);
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Text handed to the classifiers.
    pub fn classifier_text(&self) -> String {
        format!("{} {}", self.subject, self.body).trim().to_string()
    }
}

/// Ticket priority as predicted by the classifier.
///
/// Labels that do not map to a known level fall back to `Normal`, which is
/// also what the tracker receives for an unmapped priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "urgent" | "critical" => Some(Priority::Urgent),
            "high" => Some(Priority::High),
            "normal" | "medium" => Some(Priority::Normal),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }

    /// Numeric priority understood by the tracker (1 = urgent .. 4 = low).
    pub fn tracker_level(self) -> u8 {
        match self {
            Priority::Urgent => 1,
            Priority::High => 2,
            Priority::Normal => 3,
            Priority::Low => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Urgent => "Urgent",
            Priority::High => "High",
            Priority::Normal => "Normal",
            Priority::Low => "Low",
        }
    }
}

impl From<String> for Priority {
    fn from(label: String) -> Self {
        Priority::from_label(&label).unwrap_or_default()
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        p.as_str().to_string()
    }
}

/// Structured output of the prediction service. Produced once per ticket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub priority: Priority,
    #[serde(rename = "type", default)]
    pub ticket_type: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// task -> (label -> score). Not part of the tool wire format.
    #[serde(default, skip_serializing)]
    pub confidences: BTreeMap<String, BTreeMap<String, f64>>,
}

/// One option of a remote dropdown field. The set is owned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropdownOption {
    pub id: String,
    pub label: String,
    /// Index the tracker uses for index-addressed values.
    pub index: Option<i64>,
}

impl DropdownOption {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            index: None,
        }
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }
}

/// How a predicted free-text value was mapped onto a dropdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldResolution {
    pub requested: String,
    pub resolved_option: Option<DropdownOption>,
    pub exact: bool,
    /// Similarity of the chosen option (1.0 for exact matches).
    pub score: f64,
}

impl FieldResolution {
    pub fn miss(requested: &str, best_score: f64) -> Self {
        Self {
            requested: requested.to_string(),
            resolved_option: None,
            exact: false,
            score: best_score,
        }
    }

    pub fn is_miss(&self) -> bool {
        self.resolved_option.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    Written,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub status: WriteStatus,
    pub verified_at: Option<DateTime<Utc>>,
}

impl WriteOutcome {
    pub fn written(at: DateTime<Utc>) -> Self {
        Self {
            status: WriteStatus::Written,
            verified_at: Some(at),
        }
    }

    pub fn pending() -> Self {
        Self {
            status: WriteStatus::Pending,
            verified_at: None,
        }
    }
}

/// Whether a write accepted by the tracker but not yet visible on read-back
/// counts as success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    #[default]
    Tolerant,
    Strict,
}

impl Strictness {
    pub fn from_flag(strict: bool) -> Self {
        if strict {
            Strictness::Strict
        } else {
            Strictness::Tolerant
        }
    }
}

/// A record created in the remote tracker. Ownership moves to the tracker
/// as soon as it exists; nothing here deletes or lists tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalTask {
    pub id: String,
    pub url: String,
}

/// Final, externally visible result of one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionResult {
    Created(ExternalTask),
    Failed { reason: String },
}

impl SubmissionResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        SubmissionResult::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SubmissionResult::Created(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            SubmissionResult::Created(task) => json!({
                "ok": true,
                "task_id": task.id,
                "task_url": task.url,
            }),
            SubmissionResult::Failed { reason } => json!({ "ok": false, "reason": reason }),
        }
    }
}
