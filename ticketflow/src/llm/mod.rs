//! Language-model clients used by the planner.
//!
//! The planner only needs `prompt -> completion text`; both providers are
//! called without streaming and with deterministic sampling by default.

use crate::config::{LlmConfig, LlmProvider};
use crate::utils::log_redaction::preview_for_logs;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
}

/// Builds the configured client.
pub fn from_config(config: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    Ok(match config.provider {
        LlmProvider::Ollama => Arc::new(OllamaClient::new(config)?),
        LlmProvider::Openai => Arc::new(OpenAiCompatibleClient::new(config)?),
    })
}

fn http_client(config: &LlmConfig) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Ollama `/api/generate`.
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f64,
    context_window: u32,
    max_tokens: u32,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or("http://127.0.0.1:11434")
                .trim_end_matches('/')
                .to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            context_window: config.context_window,
            max_tokens: config.max_tokens,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request_body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_ctx": self.context_window,
                "num_predict": self.max_tokens,
            }
        });
        debug!("Sending {} prompt chars to Ollama model {}", prompt.len(), self.model);

        let response = self.client.post(&url).json(&request_body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, error_text);
        }

        let response_json: Value = response.json().await?;
        let content = response_json["response"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format"))?
            .to_string();
        debug!("Ollama replied: {}", preview_for_logs(&content));
        Ok(content)
    }
}

/// Any OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("llm.api_key (or TICKETFLOW_LLM_API_KEY) is required for the openai provider"))?;
        Ok(Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request_body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        debug!("Sending {} prompt chars to {}", prompt.len(), url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {}: {}", status, error_text);
        }

        let response_json: Value = response.json().await?;
        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format"))?
            .to_string();
        debug!("Model replied: {}", preview_for_logs(&content));
        Ok(content)
    }
}
