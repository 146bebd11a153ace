use super::parser::{ParseFailure, Parsed};
use super::transcript::ActionOrigin;
use crate::tools::{CreateTaskInput, TicketInput, ToolCall, ToolName, ToolOutput};
use crate::types::Prediction;
use tracing::{info, warn};

/// Best state known so far, used to synthesize actions.
#[derive(Debug, Clone)]
pub struct Progress {
    raw: TicketInput,
    last_clean: Option<TicketInput>,
    last_pred: Option<Prediction>,
    dup_hash: Option<String>,
}

impl Progress {
    pub fn new(raw: TicketInput) -> Self {
        Self {
            raw,
            last_clean: None,
            last_pred: None,
            dup_hash: None,
        }
    }

    pub fn record(&mut self, output: &ToolOutput) {
        match output {
            ToolOutput::Cleaned { subject, body } => {
                self.last_clean = Some(TicketInput::new(subject.clone(), body.clone()));
            }
            ToolOutput::NotDuplicate { dup_hash } => self.dup_hash = Some(dup_hash.clone()),
            ToolOutput::Predicted(prediction) => self.last_pred = Some(prediction.clone()),
            ToolOutput::Created { .. } => {}
        }
    }

    pub fn dup_hash(&self) -> Option<&str> {
        self.dup_hash.as_deref()
    }

    /// Cleaned text where non-blank, else the raw input, part by part.
    pub fn best_text(&self) -> TicketInput {
        let pick = |clean: Option<&String>, raw: &String| {
            clean
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| raw.trim())
                .to_string()
        };
        let clean = self.last_clean.as_ref();
        TicketInput::new(
            pick(clean.map(|c| &c.subject), &self.raw.subject),
            pick(clean.map(|c| &c.body), &self.raw.body),
        )
    }

    pub fn synthesize(&self, tool: ToolName) -> ToolCall {
        match tool {
            ToolName::CleanText => ToolCall::CleanText(self.raw.clone()),
            ToolName::CheckDuplicate => ToolCall::CheckDuplicate(self.best_text()),
            ToolName::PredictPipeline => ToolCall::PredictPipeline(self.best_text()),
            ToolName::CreateClickupTask => {
                let text = self.best_text();
                ToolCall::CreateClickupTask(CreateTaskInput {
                    subject: text.subject,
                    body: text.body,
                    pred: self.last_pred.clone().unwrap_or_default(),
                })
            }
        }
    }
}

/// The action that will actually run at a step.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    pub call: ToolCall,
    pub thought: String,
    pub origin: ActionOrigin,
}

/// Pins each step to its canonical tool and fills in for the model when its
/// output is unusable.
#[derive(Debug, Clone)]
pub struct FallbackController {
    sequence: Vec<ToolName>,
}

impl FallbackController {
    pub fn new(sequence: Vec<ToolName>) -> Self {
        Self { sequence }
    }

    pub fn sequence(&self) -> &[ToolName] {
        &self.sequence
    }

    pub fn canonical(&self, step: usize) -> Option<ToolName> {
        self.sequence.get(step).copied()
    }

    pub fn resolve(
        &self,
        canonical: ToolName,
        proposal: Result<Parsed, ParseFailure>,
        progress: &Progress,
    ) -> PlannedAction {
        let synthesized = |thought: String, origin: ActionOrigin| PlannedAction {
            call: progress.synthesize(canonical),
            thought,
            origin,
        };

        match proposal {
            Ok(parsed) if parsed.tool == canonical => {
                match ToolCall::from_payload(canonical, &parsed.payload) {
                    Ok(call) => PlannedAction {
                        call,
                        thought: parsed.thought,
                        origin: ActionOrigin::Model,
                    },
                    Err(e) => {
                        warn!("Payload for {} does not fit its input ({}); synthesizing", canonical, e);
                        synthesized(parsed.thought, ActionOrigin::Synthesized)
                    }
                }
            }
            Ok(parsed) => {
                info!("Model proposed {}; forcing {}", parsed.tool, canonical);
                synthesized(parsed.thought, ActionOrigin::Forced)
            }
            Err(failure) => {
                info!("Fallback synthesizes {} after: {}", canonical, failure);
                synthesized(default_thought(canonical).to_string(), ActionOrigin::Synthesized)
            }
        }
    }
}

fn default_thought(tool: ToolName) -> &'static str {
    match tool {
        ToolName::CleanText => "I will clean the text.",
        ToolName::CheckDuplicate => "I will check whether this ticket was already submitted.",
        ToolName::PredictPipeline => "I will run the ML pipeline to get predictions.",
        ToolName::CreateClickupTask => "I will create the ClickUp task and set fields.",
    }
}
