//! Ticketflow agent
//!
//! Turns one support ticket into a tracker task and prints the result JSON.
//!
//! Usage:
//!   ticketflow-agent submit --subject "VPN drops" --body "every hour"
//!   ticketflow-agent submit --direct --subject ... --body ...
//!   ticketflow-agent fields
//!   ticketflow-agent check

use clap::{Parser, Subcommand};
use serde_json::json;
use ticketflow::config::LlmProvider;
use ticketflow::{Pipeline, TicketflowConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ticketflow-agent")]
#[command(about = "Support-ticket intake agent")]
struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(long, env = "TICKETFLOW_CONFIG_PATH")]
    config_path: Option<String>,

    /// Target list (overrides config and CLICKUP_LIST_ID)
    #[arg(long)]
    list_id: Option<String>,

    /// LLM provider: ollama or openai
    #[arg(long, env = "TICKETFLOW_LLM_PROVIDER")]
    llm_provider: Option<String>,

    #[arg(long, env = "TICKETFLOW_LLM_MODEL")]
    llm_model: Option<String>,

    #[arg(long, env = "TICKETFLOW_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Fail field writes that are accepted but never become visible
    #[arg(long)]
    strict: bool,

    /// Agent step budget (defaults to the canonical sequence length)
    #[arg(long)]
    max_steps: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit one ticket
    Submit {
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Skip the language model and call the tools in order
        #[arg(long)]
        direct: bool,
    },
    /// Print the target list's custom-field metadata
    Fields,
    /// Validate configuration and credentials presence
    Check,
}

impl Args {
    fn load_config(&self) -> anyhow::Result<TicketflowConfig> {
        let mut config = match &self.config_path {
            Some(path) => TicketflowConfig::load(path)?,
            None => TicketflowConfig::from_env(),
        };

        if let Some(list_id) = &self.list_id {
            config.tracker.list_id = Some(list_id.clone());
        }
        if let Some(provider) = &self.llm_provider {
            config.llm.provider = match provider.to_ascii_lowercase().as_str() {
                "ollama" => LlmProvider::Ollama,
                "openai" => LlmProvider::Openai,
                other => anyhow::bail!("Unknown LLM provider '{}' (expected ollama or openai)", other),
            };
        }
        if let Some(model) = &self.llm_model {
            config.llm.model = model.clone();
        }
        if let Some(base_url) = &self.llm_base_url {
            config.llm.base_url = Some(base_url.clone());
        }
        if self.strict {
            config.reconcile.strict = true;
        }
        if self.max_steps.is_some() {
            config.agent.max_steps = self.max_steps;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only the result JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ticketflow=info".parse()?),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    if let Some(path) = &args.config_path {
        info!("Using configuration: {}", path);
    }

    match args.command {
        Command::Submit {
            subject,
            body,
            direct,
        } => {
            let pipeline = Pipeline::from_config(&config)?;
            let result = if direct {
                pipeline.service().submit(&subject, &body).await
            } else {
                pipeline.agent(&config)?.run(&subject, &body).await
            };
            println!("{}", serde_json::to_string_pretty(&result.to_json())?);
            if !result.is_ok() {
                std::process::exit(1);
            }
        }
        Command::Fields => {
            let pipeline = Pipeline::from_config(&config)?;
            let fields = pipeline.tracker.list_fields().await?;
            println!("{}", serde_json::to_string_pretty(&fields)?);
        }
        Command::Check => {
            let token = config.tracker.token().is_ok();
            let list_id = config.tracker.list_id.is_some();
            let llm_key = config.llm.provider == LlmProvider::Ollama || config.llm.api_key.is_some();
            let report = json!({
                "ok": token && list_id && llm_key,
                "tracker": {
                    "token_present": token,
                    "token_env": config.tracker.token_env,
                    "list_id_present": list_id,
                    "type_field_id": config.tracker.type_field_id,
                    "department_field_id": config.tracker.department_field_id,
                },
                "llm": {
                    "provider": config.llm.provider,
                    "model": config.llm.model,
                    "credentials_ready": llm_key,
                },
                "prediction": { "base_url": config.prediction.base_url },
                "dedup": {
                    "enabled": config.dedup.enabled,
                    "path": config.dedup.path,
                    "ttl_days": config.dedup.ttl_days,
                },
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
