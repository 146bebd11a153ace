//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticketflow::config::TicketflowConfig;
use ticketflow::llm::LanguageModel;
use ticketflow::prediction::{Classifier, FanOutPredictor, PredictionService, PredictionTask, TaskOutput};
use ticketflow::text_clean::HeuristicCleaner;
use ticketflow::tracker::{Endpoint, TrackerError, TrackerTransport, Verb};
use ticketflow::Pipeline;

pub const LIST_ID: &str = "L1";
pub const TYPE_FIELD: &str = "FT";
pub const DEPARTMENT_FIELD: &str = "FD";

/// Tracker backed by a map. Field writes become visible on read-back unless
/// `hide_writes` is set.
#[derive(Default)]
pub struct MemoryTracker {
    pub hide_writes: bool,
    pub created: Mutex<Vec<Value>>,
    pub description: Mutex<String>,
    pub fields: Mutex<HashMap<String, Value>>,
    pub tags: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<(Verb, String)>>,
}

impl MemoryTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lagging() -> Arc<Self> {
        Arc::new(Self {
            hide_writes: true,
            ..Self::default()
        })
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn field(&self, field_id: &str) -> Option<Value> {
        self.fields.lock().unwrap().get(field_id).cloned()
    }

    pub fn description(&self) -> String {
        self.description.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackerTransport for MemoryTracker {
    async fn request(
        &self,
        verb: Verb,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value, TrackerError> {
        self.requests.lock().unwrap().push((verb, endpoint.path()));
        match (verb, endpoint) {
            (Verb::Post, Endpoint::ListTasks { .. }) => {
                let body = body.cloned().unwrap_or(Value::Null);
                *self.description.lock().unwrap() =
                    body["description"].as_str().unwrap_or_default().to_string();
                let mut created = self.created.lock().unwrap();
                created.push(body);
                let id = format!("task-{}", created.len());
                Ok(json!({ "id": id, "url": format!("https://app.example/t/{}", id) }))
            }
            (Verb::Get, Endpoint::ListFields { .. }) => Ok(json!({"fields": [
                {"id": TYPE_FIELD, "name": "Type", "type": "drop_down", "type_config": {"options": [
                    {"id": "t-incident", "name": "Incident", "orderindex": 0},
                    {"id": "t-request", "name": "Service Request", "orderindex": 1},
                    {"id": "t-problem", "name": "Problem", "orderindex": 2}
                ]}},
                {"id": DEPARTMENT_FIELD, "name": "Department", "type": "drop_down", "type_config": {"options": [
                    {"id": "d-it", "name": "IT", "orderindex": 0},
                    {"id": "d-facilities", "name": "Facilities", "orderindex": 1},
                    {"id": "d-hr", "name": "Human Resources", "orderindex": 2}
                ]}}
            ]})),
            (Verb::Get, Endpoint::List { .. }) => Ok(json!({"id": LIST_ID, "space": {"id": "S1"}})),
            (Verb::Post, Endpoint::TaskField { field_id, .. }) => {
                if !self.hide_writes {
                    let value = body.map(|b| b["value"].clone()).unwrap_or(Value::Null);
                    self.fields.lock().unwrap().insert(field_id.clone(), value);
                }
                Ok(json!({}))
            }
            (Verb::Get, Endpoint::Task { task_id }) => {
                let custom_fields: Vec<Value> = self
                    .fields
                    .lock()
                    .unwrap()
                    .iter()
                    .map(|(id, value)| json!({"id": id, "value": value}))
                    .collect();
                Ok(json!({
                    "id": task_id,
                    "description": self.description(),
                    "custom_fields": custom_fields,
                }))
            }
            (Verb::Put, Endpoint::Task { .. }) => {
                if let Some(d) = body.and_then(|b| b["description"].as_str()) {
                    *self.description.lock().unwrap() = d.to_string();
                }
                Ok(json!({}))
            }
            (Verb::Post, Endpoint::TaskTag { tag, .. }) => {
                self.tags.lock().unwrap().push(tag.clone());
                Ok(json!({}))
            }
            _ => Ok(json!({})),
        }
    }
}

/// Language model that replays canned replies, then keeps answering with
/// text that carries no action.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn silent() -> Arc<Self> {
        Self::new(Vec::<String>::new())
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "I am not sure what to do next.".to_string()))
    }
}

/// Formats one well-formed planning turn.
pub fn turn(tool: &str, input: Value) -> String {
    format!("Thought: next step is {}\nAction: {}\nAction Input: {}", tool, tool, input)
}

/// Classifier answering fixed labels per task, optionally stalling one task.
pub struct FixedClassifier {
    labels: HashMap<PredictionTask, Vec<String>>,
    stall: Option<(PredictionTask, Duration)>,
    pub calls: Mutex<Vec<PredictionTask>>,
}

impl FixedClassifier {
    pub fn new(priority: &str, ticket_type: &str, department: &str, tags: &[&str]) -> Self {
        let labels = HashMap::from([
            (PredictionTask::Priority, vec![priority.to_string()]),
            (PredictionTask::Type, vec![ticket_type.to_string()]),
            (PredictionTask::Department, vec![department.to_string()]),
            (
                PredictionTask::Tags,
                tags.iter().map(|t| t.to_string()).collect(),
            ),
        ]);
        Self {
            labels,
            stall: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn stalling(mut self, task: PredictionTask, delay: Duration) -> Self {
        self.stall = Some((task, delay));
        self
    }

    pub fn calls_for(&self, task: PredictionTask) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| **t == task).count()
    }
}

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, task: PredictionTask, _text: &str) -> anyhow::Result<TaskOutput> {
        self.calls.lock().unwrap().push(task);
        if let Some((stalled, delay)) = self.stall {
            if stalled == task {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(TaskOutput {
            labels: self.labels.get(&task).cloned().unwrap_or_default(),
            scores: Default::default(),
        })
    }
}

pub fn sso_classifier() -> FixedClassifier {
    FixedClassifier::new("High", "Incident", "IT", &["SSO", "Login"])
}

pub fn config() -> TicketflowConfig {
    let mut config = TicketflowConfig::default();
    config.tracker.list_id = Some(LIST_ID.to_string());
    config.tracker.app_url = "https://app.example/t".to_string();
    config.tracker.type_field_id = TYPE_FIELD.to_string();
    config.tracker.department_field_id = DEPARTMENT_FIELD.to_string();
    config.dedup.enabled = true;
    config.dedup.path = None;
    config.reconcile.max_wait_secs = 3.0;
    config
}

pub fn pipeline(
    config: &TicketflowConfig,
    tracker: Arc<MemoryTracker>,
    classifier: Arc<FixedClassifier>,
) -> Pipeline {
    let predictor: Arc<dyn PredictionService> = Arc::new(FanOutPredictor::new(
        classifier,
        config.prediction.task_timeout(),
        config.prediction.retry_once,
    ));
    Pipeline::with_components(config, tracker, predictor, Arc::new(HeuristicCleaner))
        .expect("test config has a list id")
}
