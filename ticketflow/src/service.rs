//! Non-agent submission path: the same tools, called in canonical order
//! without a language model.

use crate::agent::{canonical_sequence, commit_dedup, Progress};
use crate::error::TicketError;
use crate::tools::{TicketInput, ToolDispatcher};
use crate::types::{SubmissionResult, Ticket};
use std::sync::Arc;
use tracing::info;

pub struct SubmissionService {
    dispatcher: Arc<ToolDispatcher>,
}

impl SubmissionService {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn submit(&self, subject: &str, body: &str) -> SubmissionResult {
        let ticket = match Ticket::new(subject, body) {
            Ok(ticket) => ticket,
            Err(e) => return SubmissionResult::failed(e.reason("intake")),
        };
        let mut progress = Progress::new(TicketInput::new(ticket.subject.clone(), ticket.body.clone()));

        for tool in canonical_sequence(self.dispatcher.dedup().is_some()) {
            let call = progress.synthesize(tool);
            let output = match self.dispatcher.dispatch(&call).await {
                Ok(output) => output,
                Err(failure) => {
                    info!("Direct submission of {} stopped at {}: {}", ticket.id(), tool, failure.reason);
                    return SubmissionResult::failed(failure.reason);
                }
            };
            progress.record(&output);

            if let Some(task) = output.task() {
                if let (Some(dedup), Some(hash)) = (self.dispatcher.dedup(), progress.dup_hash()) {
                    commit_dedup(dedup, hash);
                }
                return SubmissionResult::Created(task.clone());
            }
        }
        SubmissionResult::failed(TicketError::AgentIncomplete.reason("submit"))
    }
}
