use super::{CreateTaskInput, Observation, TicketInput, ToolCall, ToolFailure, ToolOutput};
use crate::dedup::DedupGuard;
use crate::prediction::PredictionService;
use crate::reconcile::ReconciliationEngine;
use crate::text_clean::TextCleaner;
use crate::utils::hash::content_hash;
use std::sync::Arc;
use tracing::warn;

const UNTITLED: &str = "(no subject)";

/// Runs tool calls against the pipeline components. Every call yields an
/// [`Observation`]; errors never escape as panics or `Err` of another type.
pub struct ToolDispatcher {
    cleaner: Arc<dyn TextCleaner>,
    dedup: Option<Arc<DedupGuard>>,
    predictor: Arc<dyn PredictionService>,
    engine: Arc<ReconciliationEngine>,
}

impl ToolDispatcher {
    pub fn new(
        cleaner: Arc<dyn TextCleaner>,
        dedup: Option<Arc<DedupGuard>>,
        predictor: Arc<dyn PredictionService>,
        engine: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            cleaner,
            dedup,
            predictor,
            engine,
        }
    }

    pub fn dedup(&self) -> Option<&Arc<DedupGuard>> {
        self.dedup.as_ref()
    }

    pub async fn dispatch(&self, call: &ToolCall) -> Observation {
        match call {
            ToolCall::CleanText(input) => Ok(self.clean_text(input)),
            ToolCall::CheckDuplicate(input) => self.check_duplicate(input),
            ToolCall::PredictPipeline(input) => self.predict_pipeline(input).await,
            ToolCall::CreateClickupTask(input) => self.create_task(input).await,
        }
    }

    fn clean_text(&self, input: &TicketInput) -> ToolOutput {
        let (subject, body) = self.cleaner.clean(&input.subject, &input.body);
        ToolOutput::Cleaned { subject, body }
    }

    fn check_duplicate(&self, input: &TicketInput) -> Observation {
        let Some(dedup) = &self.dedup else {
            return Ok(ToolOutput::NotDuplicate {
                dup_hash: content_hash(&input.subject, &input.body),
            });
        };
        let check = dedup.check_and_maybe_remember(&input.subject, &input.body);
        if check.is_duplicate {
            return Err(ToolFailure {
                reason: "duplicate_found".to_string(),
                dup_hash: Some(check.hash),
            });
        }
        Ok(ToolOutput::NotDuplicate {
            dup_hash: check.hash,
        })
    }

    async fn predict_pipeline(&self, input: &TicketInput) -> Observation {
        self.predictor
            .predict(&input.subject, &input.body)
            .await
            .map(ToolOutput::Predicted)
            .map_err(|e| ToolFailure::new(e.reason("predict")))
    }

    async fn create_task(&self, input: &CreateTaskInput) -> Observation {
        let subject = match input.subject.trim() {
            "" => UNTITLED,
            s => s,
        };
        let tracker = self.engine.tracker();
        let task = tracker
            .create_task(subject, input.body.trim(), input.pred.priority)
            .await
            .map_err(|e| ToolFailure::new(e.reason("create_task")))?;

        match self.engine.apply_prediction(&task.id, &input.pred).await {
            Ok(report) => Ok(ToolOutput::Created {
                task,
                notes: report.notes,
            }),
            Err(e) => {
                let applied = e.report.fields.len().saturating_sub(1);
                warn!(
                    "Task {} created but {} failed after {} field(s) applied: {}",
                    task.id, e.stage, applied, e.source
                );
                Err(ToolFailure::new(e.reason()))
            }
        }
    }
}
