use crate::tools::ToolName;
use serde::Serialize;
use serde_json::Value;

/// How the executed action was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOrigin {
    /// The model proposed the canonical tool with a usable payload.
    Model,
    /// The model proposed another tool; the canonical one ran instead.
    Forced,
    /// No usable proposal; the fallback controller built the action.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionRecord {
    pub thought: String,
    pub tool: ToolName,
    pub input: Value,
    pub observation: Value,
    pub origin: ActionOrigin,
}

/// Append-only log of executed actions; the only state carried between
/// loop steps.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    records: Vec<ActionRecord>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ActionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ActionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Scratchpad text in the same `Thought/Action/Action Input/Observation`
    /// form the model is asked to produce.
    pub fn render(&self) -> String {
        self.records
            .iter()
            .map(|r| {
                format!(
                    "Thought: {}\nAction: {}\nAction Input: {}\nObservation: {}\n",
                    r.thought, r.tool, r.input, r.observation
                )
            })
            .collect()
    }
}
