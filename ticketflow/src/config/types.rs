use crate::error::{TicketError, TicketResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketflowConfig {
    pub tracker: TrackerConfig,
    pub llm: LlmConfig,
    pub prediction: PredictionConfig,
    pub reconcile: ReconcileConfig,
    pub dedup: DedupConfig,
    pub agent: AgentLoopConfig,
}

impl TicketflowConfig {
    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> TicketResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TicketError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> TicketResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TicketError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TicketResult<()> {
        self.prediction.validate()?;
        self.reconcile.validate()
    }

    /// Defaults plus environment overrides, for running without a file.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    pub fn apply_env(&mut self) {
        if let Ok(list_id) = std::env::var("CLICKUP_LIST_ID") {
            self.tracker.list_id = Some(list_id);
        }
        if let Ok(team_id) = std::env::var("CLICKUP_TEAM_ID") {
            self.tracker.team_id = Some(team_id);
        }
        if let Ok(key) = std::env::var("TICKETFLOW_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub base_url: String,
    /// Prefix for synthesized task links when the API omits `url`.
    pub app_url: String,
    pub list_id: Option<String>,
    pub team_id: Option<String>,
    /// Name of the environment variable holding the API token.
    pub token_env: String,
    pub type_field_id: String,
    pub department_field_id: String,
    pub request_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.clickup.com/api/v2".to_string(),
            app_url: "https://app.clickup.com/t".to_string(),
            list_id: None,
            team_id: None,
            token_env: "CLICKUP_TOKEN".to_string(),
            type_field_id: "660e1b3b-ec41-40a6-9863-979e44951c70".to_string(),
            department_field_id: "90647e3f-2209-4d5c-be47-7780a883ac28".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl TrackerConfig {
    pub fn token(&self) -> TicketResult<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TicketError::Config(format!("{} is not set", self.token_env)))
    }

    pub fn require_list_id(&self) -> TicketResult<&str> {
        self.list_id
            .as_deref()
            .ok_or_else(|| TicketError::Config("CLICKUP_LIST_ID is not set".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Ollama,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub context_window: u32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            model: "llama3".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.0,
            max_tokens: 512,
            context_window: 4096,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub base_url: String,
    pub timeout_secs: f64,
    pub retry_once: bool,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_secs: 8.0,
            retry_once: true,
        }
    }
}

impl PredictionConfig {
    pub fn task_timeout(&self) -> Duration {
        seconds(self.timeout_secs)
    }

    fn validate(&self) -> TicketResult<()> {
        non_negative_secs("prediction.timeout_secs", self.timeout_secs)
    }
}

/// Seconds to a `Duration`; negative and NaN become zero, overflow saturates.
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

fn non_negative_secs(name: &str, value: f64) -> TicketResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(TicketError::Config(format!(
            "{} must be a non-negative number of seconds, got {}",
            name, value
        )))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub similarity_threshold: f64,
    pub max_wait_secs: f64,
    pub poll_initial_secs: f64,
    pub poll_step_secs: f64,
    pub poll_cap_secs: f64,
    /// Treat a Pending write (accepted, not yet readable) as a failure.
    pub strict: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.78,
            max_wait_secs: 12.0,
            poll_initial_secs: 0.5,
            poll_step_secs: 0.3,
            poll_cap_secs: 2.0,
            strict: false,
        }
    }
}

impl ReconcileConfig {
    pub fn max_wait(&self) -> Duration {
        seconds(self.max_wait_secs)
    }

    fn validate(&self) -> TicketResult<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(TicketError::Config(format!(
                "reconcile.similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        non_negative_secs("reconcile.max_wait_secs", self.max_wait_secs)?;
        non_negative_secs("reconcile.poll_step_secs", self.poll_step_secs)?;
        non_negative_secs("reconcile.poll_cap_secs", self.poll_cap_secs)?;
        non_negative_secs("reconcile.poll_initial_secs", self.poll_initial_secs)?;
        if self.poll_initial_secs == 0.0 {
            return Err(TicketError::Config(
                "reconcile.poll_initial_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
    pub ttl_days: i64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Some(PathBuf::from(".dup_cache.json")),
            ttl_days: 7,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentLoopConfig {
    /// Step budget; defaults to the length of the canonical sequence.
    pub max_steps: Option<usize>,
}
