//! ClickUp REST transport.

use super::{Endpoint, TrackerError, TrackerTransport, Verb};
use crate::config::TrackerConfig;
use crate::error::{TicketError, TicketResult};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub struct ClickUpTransport {
    base_url: String,
    token: String,
    team_id: Option<String>,
    client: Client,
}

impl ClickUpTransport {
    pub fn new(base_url: &str, token: String, team_id: Option<String>, timeout: Duration) -> TicketResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TicketError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            team_id,
            client,
        })
    }

    pub fn from_config(config: &TrackerConfig) -> TicketResult<Self> {
        Self::new(
            &config.base_url,
            config.token()?,
            config.team_id.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Workspaces using custom task ids need these on every `/task/{id}` call.
    fn task_params(&self) -> Vec<(&'static str, String)> {
        match &self.team_id {
            Some(team_id) => vec![
                ("custom_task_ids", "true".to_string()),
                ("team_id", team_id.clone()),
            ],
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl TrackerTransport for ClickUpTransport {
    async fn request(
        &self,
        verb: Verb,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value, TrackerError> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let method = match verb {
            Verb::Get => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
        };
        debug!("{} {}", verb, url);

        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", &self.token)
            .header("Content-Type", "application/json");
        if endpoint.is_task_scoped() {
            request = request.query(&self.task_params());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TrackerError::new(None, verb, endpoint, e.to_string()))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TrackerError::new(Some(status.as_u16()), verb, endpoint, text));
        }
        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        // Some 2xx answers carry no JSON; callers only need the status then.
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({})))
    }
}
