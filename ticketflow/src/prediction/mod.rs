//! Label prediction.
//!
//! The transformer models live behind a [`Classifier`]; this module owns the
//! fan-out across the four classification tasks. Each task runs under its own
//! timeout with a single retry, and the first task that still fails aborts
//! its siblings. A prediction is returned whole or not at all.

pub mod http;

use crate::error::{TicketError, TicketResult};
use crate::types::{Prediction, Priority, Ticket};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub use http::HttpClassifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionTask {
    Priority,
    Type,
    Department,
    Tags,
}

impl PredictionTask {
    pub const ALL: [PredictionTask; 4] = [
        PredictionTask::Tags,
        PredictionTask::Department,
        PredictionTask::Type,
        PredictionTask::Priority,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PredictionTask::Priority => "priority",
            PredictionTask::Type => "type",
            PredictionTask::Department => "department",
            PredictionTask::Tags => "tags",
        }
    }

    pub fn is_multilabel(self) -> bool {
        matches!(self, PredictionTask::Tags)
    }
}

impl fmt::Display for PredictionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output of one classification task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    /// Predicted labels; single-label tasks use the first one.
    #[serde(alias = "preds")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
}

/// One classification model per task.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, task: PredictionTask, text: &str) -> anyhow::Result<TaskOutput>;
}

/// `predict(subject, body) -> Prediction` seam used by the `predict_pipeline` tool.
#[async_trait]
pub trait PredictionService: Send + Sync {
    async fn predict(&self, subject: &str, body: &str) -> TicketResult<Prediction>;
}

pub struct FanOutPredictor {
    classifier: Arc<dyn Classifier>,
    task_timeout: Duration,
    retry_once: bool,
}

impl FanOutPredictor {
    pub fn new(classifier: Arc<dyn Classifier>, task_timeout: Duration, retry_once: bool) -> Self {
        Self {
            classifier,
            task_timeout,
            retry_once,
        }
    }

    async fn run_task(
        classifier: Arc<dyn Classifier>,
        task: PredictionTask,
        text: Arc<str>,
        timeout: Duration,
        retry_once: bool,
    ) -> Result<TaskOutput, String> {
        let attempts = if retry_once { 2 } else { 1 };
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match tokio::time::timeout(timeout, classifier.classify(task, &text)).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("timed out after {:.1}s", timeout.as_secs_f64()),
            }
            warn!(
                "Classifier '{}' attempt {}/{} failed: {}",
                task, attempt, attempts, last_error
            );
        }
        Err(last_error)
    }
}

#[async_trait]
impl PredictionService for FanOutPredictor {
    async fn predict(&self, subject: &str, body: &str) -> TicketResult<Prediction> {
        let ticket = Ticket::new(subject, body)?;
        let text: Arc<str> = Arc::from(ticket.classifier_text());

        let mut join_set = JoinSet::new();
        for task in PredictionTask::ALL {
            let classifier = self.classifier.clone();
            let text = text.clone();
            let timeout = self.task_timeout;
            let retry_once = self.retry_once;
            join_set.spawn(async move {
                let result = Self::run_task(classifier, task, text, timeout, retry_once).await;
                (task, result)
            });
        }

        let mut outputs: BTreeMap<PredictionTask, TaskOutput> = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((task, Ok(output))) => {
                    debug!("Classifier '{}' returned {:?}", task, output.labels);
                    outputs.insert(task, output);
                }
                Ok((task, Err(cause))) => {
                    join_set.abort_all();
                    return Err(TicketError::PredictionFailed {
                        task: task.name().to_string(),
                        cause,
                    });
                }
                Err(join_error) => {
                    join_set.abort_all();
                    return Err(TicketError::PredictionFailed {
                        task: "unknown".to_string(),
                        cause: join_error.to_string(),
                    });
                }
            }
        }

        let prediction = assemble(outputs);
        info!(
            "Prediction for ticket {}: priority={} type='{}' department='{}' tags={}",
            ticket.id(),
            prediction.priority.as_str(),
            prediction.ticket_type,
            prediction.department,
            prediction.tags.len()
        );
        Ok(prediction)
    }
}

fn assemble(mut outputs: BTreeMap<PredictionTask, TaskOutput>) -> Prediction {
    let mut take = |task: PredictionTask| outputs.remove(&task).unwrap_or_default();
    let first = |output: &TaskOutput| output.labels.first().cloned().unwrap_or_default();

    let priority = take(PredictionTask::Priority);
    let ticket_type = take(PredictionTask::Type);
    let department = take(PredictionTask::Department);
    let tags = take(PredictionTask::Tags);

    let mut confidences = BTreeMap::new();
    for (task, output) in [
        (PredictionTask::Priority, &priority),
        (PredictionTask::Type, &ticket_type),
        (PredictionTask::Department, &department),
        (PredictionTask::Tags, &tags),
    ] {
        confidences.insert(task.name().to_string(), output.scores.clone());
    }

    Prediction {
        priority: Priority::from(first(&priority)),
        ticket_type: first(&ticket_type),
        department: first(&department),
        tags: tags.labels.iter().cloned().collect(),
        confidences,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone)]
    enum Behaviour {
        Labels(Vec<&'static str>),
        Fail,
        Sleep(Duration, Vec<&'static str>),
    }

    struct ScriptedClassifier {
        behaviours: HashMap<PredictionTask, Behaviour>,
        calls: HashMap<PredictionTask, AtomicUsize>,
        tags_finished: Arc<AtomicBool>,
    }

    impl ScriptedClassifier {
        fn new(behaviours: Vec<(PredictionTask, Behaviour)>) -> Self {
            Self {
                behaviours: behaviours.into_iter().collect(),
                calls: PredictionTask::ALL
                    .iter()
                    .map(|t| (*t, AtomicUsize::new(0)))
                    .collect(),
                tags_finished: Arc::new(AtomicBool::new(false)),
            }
        }

        fn calls(&self, task: PredictionTask) -> usize {
            self.calls[&task].load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(&self, task: PredictionTask, _text: &str) -> anyhow::Result<TaskOutput> {
            self.calls[&task].fetch_add(1, Ordering::SeqCst);
            let labels = match self.behaviours.get(&task).cloned() {
                Some(Behaviour::Labels(labels)) => labels,
                Some(Behaviour::Fail) => anyhow::bail!("model crashed"),
                Some(Behaviour::Sleep(d, labels)) => {
                    tokio::time::sleep(d).await;
                    labels
                }
                None => vec![],
            };
            if task == PredictionTask::Tags {
                self.tags_finished.store(true, Ordering::SeqCst);
            }
            Ok(TaskOutput {
                labels: labels.iter().map(|s| s.to_string()).collect(),
                scores: labels.iter().map(|s| (s.to_string(), 0.9)).collect(),
            })
        }
    }

    fn predictor(classifier: Arc<ScriptedClassifier>) -> FanOutPredictor {
        FanOutPredictor::new(classifier, Duration::from_secs(8), true)
    }

    #[tokio::test(start_paused = true)]
    async fn assembles_full_prediction() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![
            (PredictionTask::Priority, Behaviour::Labels(vec!["High"])),
            (PredictionTask::Type, Behaviour::Labels(vec!["Incident"])),
            (PredictionTask::Department, Behaviour::Labels(vec!["IT"])),
            (PredictionTask::Tags, Behaviour::Labels(vec!["SSO", "Login"])),
        ]));
        let pred = predictor(classifier).predict("SSO login fails", "").await.unwrap();

        assert_eq!(pred.priority, Priority::High);
        assert_eq!(pred.ticket_type, "Incident");
        assert_eq!(pred.department, "IT");
        assert!(pred.tags.contains("SSO") && pred.tags.contains("Login"));
        assert_eq!(pred.confidences["type"]["Incident"], 0.9);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_is_retried_once_then_fails_fast() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![
            (PredictionTask::Priority, Behaviour::Labels(vec!["Low"])),
            (PredictionTask::Type, Behaviour::Labels(vec!["Request"])),
            (PredictionTask::Department, Behaviour::Fail),
            (
                PredictionTask::Tags,
                Behaviour::Sleep(Duration::from_secs(5), vec!["Network"]),
            ),
        ]));
        let tags_finished = classifier.tags_finished.clone();

        let err = predictor(classifier.clone())
            .predict("VPN", "drops every hour")
            .await
            .unwrap_err();

        match err {
            TicketError::PredictionFailed { task, cause } => {
                assert_eq!(task, "department");
                assert!(cause.contains("model crashed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(classifier.calls(PredictionTask::Department), 2);
        assert!(!tags_finished.load(Ordering::SeqCst));

        // The sibling was aborted, not merely left running.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!tags_finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_on_both_attempts_names_the_task() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![
            (
                PredictionTask::Priority,
                Behaviour::Sleep(Duration::from_secs(30), vec!["High"]),
            ),
            (PredictionTask::Type, Behaviour::Labels(vec!["Incident"])),
            (PredictionTask::Department, Behaviour::Labels(vec!["IT"])),
            (PredictionTask::Tags, Behaviour::Labels(vec![])),
        ]));

        let err = predictor(classifier.clone())
            .predict("Disk full", "server 3")
            .await
            .unwrap_err();
        let reason = err.reason("predict");
        assert!(reason.starts_with("prediction_failed: priority"), "{reason}");
        assert!(reason.contains("timed out"));
        assert_eq!(classifier.calls(PredictionTask::Priority), 2);
    }

    #[tokio::test]
    async fn empty_ticket_never_reaches_classifiers() {
        let classifier = Arc::new(ScriptedClassifier::new(vec![]));
        let err = predictor(classifier.clone()).predict(" ", "").await.unwrap_err();
        assert!(matches!(err, TicketError::EmptyTicket));
        assert_eq!(classifier.calls(PredictionTask::Tags), 0);
    }
}
