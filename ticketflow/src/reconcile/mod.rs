//! Reconciliation of a prediction onto a created task.
//!
//! For each essential dropdown (type, department) the predicted label is
//! matched against the field's options, written through whichever request
//! shape the tracker accepts, then read back until visible. Fuzzy matches
//! and unverified writes are recorded as notes on the task description.
//! Tags are attached last and never fail the submission.

pub mod matcher;
pub mod options;
pub mod tags;
pub mod verifier;
pub mod writer;

use crate::config::{seconds, ReconcileConfig, TrackerConfig};
use crate::error::TicketError;
use crate::tracker::{field_note, tags_note, TrackerClient};
use crate::types::{FieldResolution, Prediction, Strictness, WriteOutcome, WriteStatus};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use matcher::{
    normalize_label, DropdownMatcher, MatchingBlocksRatio, NormalizedLevenshtein, SimilarityScorer,
};
pub use options::FieldOptionsCache;
pub use tags::TagAttacher;
pub use verifier::{ConsistencyVerifier, PollBackoff};
pub use writer::FieldWriter;

/// Prediction attribute that feeds a dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictedAttribute {
    Type,
    Department,
}

/// An essential dropdown field and the prediction attribute feeding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratedField {
    /// Human label used in notes ("Type", "Department").
    pub label: &'static str,
    /// Stage name reported on failure ("type_set", "department_set").
    pub stage: &'static str,
    pub field_id: String,
    pub source: PredictedAttribute,
}

impl EnumeratedField {
    pub fn ticket_type(field_id: impl Into<String>) -> Self {
        Self {
            label: "Type",
            stage: "type_set",
            field_id: field_id.into(),
            source: PredictedAttribute::Type,
        }
    }

    pub fn department(field_id: impl Into<String>) -> Self {
        Self {
            label: "Department",
            stage: "department_set",
            field_id: field_id.into(),
            source: PredictedAttribute::Department,
        }
    }

    fn requested<'p>(&self, prediction: &'p Prediction) -> &'p str {
        match self.source {
            PredictedAttribute::Type => &prediction.ticket_type,
            PredictedAttribute::Department => &prediction.department,
        }
    }
}

/// A failed essential field, with the stage used in the wire reason.
/// `report` holds what was applied before the failure, ending with the
/// failed field.
#[derive(Debug, Error)]
#[error("{stage}: {source}")]
pub struct FieldSetError {
    pub stage: &'static str,
    #[source]
    pub source: TicketError,
    pub report: ReconcileReport,
}

impl FieldSetError {
    pub fn reason(&self) -> String {
        self.source.reason(self.stage)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    pub field_id: String,
    pub requested: String,
    pub chosen: String,
    pub exact: bool,
    pub score: f64,
    pub status: WriteStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub fields: Vec<FieldReport>,
    pub failed_tags: Vec<String>,
    /// Notes appended (or attempted) on the task description, in order.
    pub notes: Vec<String>,
}

pub struct ReconciliationEngine {
    tracker: Arc<TrackerClient>,
    fields: Vec<EnumeratedField>,
    options: FieldOptionsCache,
    matcher: DropdownMatcher,
    writer: FieldWriter,
    verifier: ConsistencyVerifier,
    max_wait: Duration,
    strictness: Strictness,
}

impl ReconciliationEngine {
    pub fn new(tracker: Arc<TrackerClient>, fields: Vec<EnumeratedField>) -> Self {
        Self {
            writer: FieldWriter::new(tracker.clone()),
            verifier: ConsistencyVerifier::new(tracker.clone(), PollBackoff::default()),
            tracker,
            fields,
            options: FieldOptionsCache::new(),
            matcher: DropdownMatcher::default(),
            max_wait: Duration::from_secs(12),
            strictness: Strictness::Tolerant,
        }
    }

    pub fn from_config(
        tracker: Arc<TrackerClient>,
        tracker_config: &TrackerConfig,
        config: &ReconcileConfig,
    ) -> Self {
        let fields = vec![
            EnumeratedField::ticket_type(&tracker_config.type_field_id),
            EnumeratedField::department(&tracker_config.department_field_id),
        ];
        let backoff = PollBackoff::new(
            seconds(config.poll_initial_secs),
            seconds(config.poll_step_secs),
            seconds(config.poll_cap_secs),
        );
        let mut engine = Self::new(tracker.clone(), fields)
            .with_matcher(DropdownMatcher::new(config.similarity_threshold))
            .with_wait(config.max_wait(), Strictness::from_flag(config.strict));
        engine.verifier = ConsistencyVerifier::new(tracker, backoff);
        engine
    }

    pub fn with_matcher(mut self, matcher: DropdownMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_wait(mut self, max_wait: Duration, strictness: Strictness) -> Self {
        self.max_wait = max_wait;
        self.strictness = strictness;
        self
    }

    pub fn tracker(&self) -> &Arc<TrackerClient> {
        &self.tracker
    }

    /// Applies type, department and tags in that order. The first essential
    /// field that cannot be set ends reconciliation; the task is left as is.
    pub async fn apply_prediction(
        &self,
        task_id: &str,
        prediction: &Prediction,
    ) -> Result<ReconcileReport, FieldSetError> {
        let mut report = ReconcileReport::default();

        for field in &self.fields {
            let requested = field.requested(prediction).trim();
            if requested.is_empty() {
                warn!("No predicted {} for task {}; field left unset", field.label, task_id);
                continue;
            }
            let (resolution, outcome) = match self.apply_field(task_id, field, requested).await {
                Ok(applied) => applied,
                Err(source) => {
                    report.fields.push(FieldReport {
                        field_id: field.field_id.clone(),
                        requested: requested.to_string(),
                        chosen: String::new(),
                        exact: false,
                        score: 0.0,
                        status: WriteStatus::Failed,
                    });
                    return Err(FieldSetError {
                        stage: field.stage,
                        source,
                        report,
                    });
                }
            };

            let chosen = resolution
                .resolved_option
                .as_ref()
                .map(|o| o.label.clone())
                .unwrap_or_default();
            let pending = outcome.status == WriteStatus::Pending;
            if !resolution.exact || pending {
                let note = field_note(field.label, requested, &chosen, pending);
                self.annotate(task_id, &note).await;
                report.notes.push(note);
            }
            report.fields.push(FieldReport {
                field_id: field.field_id.clone(),
                requested: requested.to_string(),
                chosen,
                exact: resolution.exact,
                score: resolution.score,
                status: outcome.status,
            });
        }

        report.failed_tags = TagAttacher::new(&self.tracker)
            .attach_all(task_id, &prediction.tags)
            .await;
        if let Some(note) = tags_note(&report.failed_tags) {
            self.annotate(task_id, &note).await;
            report.notes.push(note);
        }

        info!(
            "Reconciled task {}: {} field(s), {} note(s), {} tag failure(s)",
            task_id,
            report.fields.len(),
            report.notes.len(),
            report.failed_tags.len()
        );
        Ok(report)
    }

    async fn apply_field(
        &self,
        task_id: &str,
        field: &EnumeratedField,
        requested: &str,
    ) -> Result<(FieldResolution, WriteOutcome), TicketError> {
        let options = self.options.options(&self.tracker, &field.field_id).await?;
        let resolution = self.matcher.resolve(&options, requested);
        let option = resolution
            .resolved_option
            .clone()
            .ok_or_else(|| TicketError::NoMatchingOption {
                field: field.label.to_string(),
                requested: requested.to_string(),
            })?;

        self.writer.write(task_id, &field.field_id, &option).await?;
        let outcome = self
            .verifier
            .await_persisted(task_id, &field.field_id, &option, self.max_wait, self.strictness)
            .await?;
        Ok((resolution, outcome))
    }

    /// Annotation failures are logged, never raised.
    async fn annotate(&self, task_id: &str, note: &str) {
        if let Err(e) = self.tracker.append_note(task_id, note).await {
            warn!("Could not annotate task {}: {}", task_id, e);
        }
    }
}
