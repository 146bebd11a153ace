//! Wiring of the concrete collaborators from configuration.

use crate::agent::AgentLoop;
use crate::config::TicketflowConfig;
use crate::dedup::DedupGuard;
use crate::llm::{self, LanguageModel};
use crate::prediction::{FanOutPredictor, HttpClassifier, PredictionService};
use crate::reconcile::ReconciliationEngine;
use crate::service::SubmissionService;
use crate::text_clean::{HeuristicCleaner, TextCleaner};
use crate::tools::ToolDispatcher;
use crate::tracker::{ClickUpTransport, TrackerClient, TrackerTransport};
use std::sync::Arc;
use tracing::info;

pub struct Pipeline {
    pub tracker: Arc<TrackerClient>,
    pub dispatcher: Arc<ToolDispatcher>,
}

impl Pipeline {
    /// Builds the HTTP-backed pipeline. Fails when credentials or the list id
    /// are missing.
    pub fn from_config(config: &TicketflowConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn TrackerTransport> =
            Arc::new(ClickUpTransport::from_config(&config.tracker)?);
        let classifier = Arc::new(HttpClassifier::new(&config.prediction.base_url)?);
        let predictor: Arc<dyn PredictionService> = Arc::new(FanOutPredictor::new(
            classifier,
            config.prediction.task_timeout(),
            config.prediction.retry_once,
        ));
        Self::with_components(config, transport, predictor, Arc::new(HeuristicCleaner))
    }

    /// Builds the pipeline around caller-supplied seams.
    pub fn with_components(
        config: &TicketflowConfig,
        transport: Arc<dyn TrackerTransport>,
        predictor: Arc<dyn PredictionService>,
        cleaner: Arc<dyn TextCleaner>,
    ) -> anyhow::Result<Self> {
        let list_id = config.tracker.require_list_id()?;
        let tracker = Arc::new(TrackerClient::new(transport, list_id, &config.tracker.app_url));
        let engine = Arc::new(ReconciliationEngine::from_config(
            tracker.clone(),
            &config.tracker,
            &config.reconcile,
        ));

        let dedup = config.dedup.enabled.then(|| {
            Arc::new(DedupGuard::new(
                config.dedup.path.clone(),
                chrono::Duration::days(config.dedup.ttl_days),
            ))
        });
        info!(
            "Pipeline ready: list {}, dedup {}",
            list_id,
            if dedup.is_some() { "on" } else { "off" }
        );

        let dispatcher = Arc::new(ToolDispatcher::new(cleaner, dedup, predictor, engine));
        Ok(Self { tracker, dispatcher })
    }

    pub fn agent(&self, config: &TicketflowConfig) -> anyhow::Result<AgentLoop> {
        let model: Arc<dyn LanguageModel> = llm::from_config(&config.llm)?;
        Ok(self.agent_with_model(model, config))
    }

    pub fn agent_with_model(&self, model: Arc<dyn LanguageModel>, config: &TicketflowConfig) -> AgentLoop {
        AgentLoop::new(model, self.dispatcher.clone(), &config.agent)
    }

    pub fn service(&self) -> SubmissionService {
        SubmissionService::new(self.dispatcher.clone())
    }
}
