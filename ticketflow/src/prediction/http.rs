//! HTTP adapter for the inference service hosting the classification models.

use super::{Classifier, PredictionTask, TaskOutput};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

pub struct HttpClassifier {
    base_url: String,
    client: Client,
}

impl HttpClassifier {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        // Per-task deadlines are enforced by the fan-out; this only bounds a stuck socket.
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, task: PredictionTask, text: &str) -> anyhow::Result<TaskOutput> {
        let url = format!("{}/predict/{}", self.base_url, task.name());
        debug!("Classifying {} chars via {}", text.len(), url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "task": task.name(), "text": text }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("inference service returned {}: {}", status, error_text);
        }

        let output: TaskOutput = response.json().await?;
        if !task.is_multilabel() && output.labels.is_empty() {
            anyhow::bail!("inference service returned no label for '{}'", task);
        }
        Ok(output)
    }
}
