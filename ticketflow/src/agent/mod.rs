//! Tool-using agent loop.
//!
//! The model plans each step in a `Thought / Action / Action Input` format,
//! but the step sequence is fixed: the fallback controller pins every step to
//! its canonical tool and synthesizes the action when the model's reply is
//! unusable, so the loop always advances. The first negative observation
//! ends the run; a created task ends it successfully.

pub mod fallback;
pub mod parser;
pub mod planner;
pub mod transcript;

use crate::config::AgentLoopConfig;
use crate::dedup::DedupGuard;
use crate::error::TicketError;
use crate::llm::LanguageModel;
use crate::tools::{observation_json, TicketInput, ToolDispatcher, ToolName};
use crate::types::{SubmissionResult, Ticket};
use std::sync::Arc;
use tracing::{info, warn};

pub use fallback::{FallbackController, PlannedAction, Progress};
pub use parser::{parse_action, ParseFailure, Parsed};
pub use planner::Planner;
pub use transcript::{ActionOrigin, ActionRecord, Transcript};

/// Canonical step order, with or without the duplicate check.
pub fn canonical_sequence(with_dedup: bool) -> Vec<ToolName> {
    let mut sequence = vec![ToolName::CleanText];
    if with_dedup {
        sequence.push(ToolName::CheckDuplicate);
    }
    sequence.push(ToolName::PredictPipeline);
    sequence.push(ToolName::CreateClickupTask);
    sequence
}

/// Outcome of one run, with the transcript that produced it.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub result: SubmissionResult,
    pub transcript: Transcript,
}

pub struct AgentLoop {
    planner: Planner,
    fallback: FallbackController,
    dispatcher: Arc<ToolDispatcher>,
    max_steps: usize,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        dispatcher: Arc<ToolDispatcher>,
        config: &AgentLoopConfig,
    ) -> Self {
        let sequence = canonical_sequence(dispatcher.dedup().is_some());
        let max_steps = config.max_steps.unwrap_or(sequence.len());
        Self {
            planner: Planner::new(model, sequence.clone()),
            fallback: FallbackController::new(sequence),
            dispatcher,
            max_steps,
        }
    }

    pub async fn run(&self, subject: &str, body: &str) -> SubmissionResult {
        self.run_with_transcript(subject, body).await.result
    }

    pub async fn run_with_transcript(&self, subject: &str, body: &str) -> AgentRun {
        let mut transcript = Transcript::new();
        let ticket = match Ticket::new(subject, body) {
            Ok(ticket) => ticket,
            Err(e) => {
                return AgentRun {
                    result: SubmissionResult::failed(e.reason("intake")),
                    transcript,
                }
            }
        };
        info!("Agent run started for ticket {}", ticket.id());

        let raw = TicketInput::new(ticket.subject.clone(), ticket.body.clone());
        let ticket_json = serde_json::to_value(&raw).unwrap_or_default();
        let mut progress = Progress::new(raw);

        for step in 0..self.max_steps {
            let Some(canonical) = self.fallback.canonical(step) else {
                break;
            };
            info!("Step {}/{}: {}", step + 1, self.max_steps, canonical);

            let proposal = self.planner.propose(&ticket_json, &transcript).await;
            let action = self.fallback.resolve(canonical, proposal, &progress);
            let observation = self.dispatcher.dispatch(&action.call).await;

            transcript.push(ActionRecord {
                thought: action.thought,
                tool: action.call.tool(),
                input: action.call.payload(),
                observation: observation_json(&observation),
                origin: action.origin,
            });

            let output = match observation {
                Ok(output) => output,
                Err(failure) => {
                    info!("Step {} stopped the run: {}", step + 1, failure.reason);
                    return AgentRun {
                        result: SubmissionResult::failed(failure.reason),
                        transcript,
                    };
                }
            };
            progress.record(&output);

            if let Some(task) = output.task() {
                self.remember(&progress);
                info!("Ticket {} submitted as task {}", ticket.id(), task.id);
                return AgentRun {
                    result: SubmissionResult::Created(task.clone()),
                    transcript,
                };
            }
        }

        warn!(
            "Ticket {} ran out of steps after {} action(s)",
            ticket.id(),
            transcript.len()
        );
        AgentRun {
            result: SubmissionResult::failed(TicketError::AgentIncomplete.reason("agent")),
            transcript,
        }
    }

    fn remember(&self, progress: &Progress) {
        let (Some(dedup), Some(hash)) = (self.dispatcher.dedup(), progress.dup_hash()) else {
            return;
        };
        commit_dedup(dedup, hash);
    }
}

/// Commit failures only cost a later duplicate check; the task exists.
pub(crate) fn commit_dedup(dedup: &DedupGuard, hash: &str) {
    if let Err(e) = dedup.commit(hash) {
        warn!("Could not persist dedup hash: {}", e);
    }
}
