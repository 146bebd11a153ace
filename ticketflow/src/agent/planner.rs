use super::parser::{parse_action, ParseFailure, Parsed};
use super::transcript::Transcript;
use crate::llm::LanguageModel;
use crate::tools::ToolName;
use crate::utils::log_redaction::preview_for_logs;
use itertools::Itertools;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Asks the model for the next action. A malformed reply gets exactly one
/// corrective re-prompt before the failure is handed back.
pub struct Planner {
    model: Arc<dyn LanguageModel>,
    sequence: Vec<ToolName>,
    system_prompt: String,
}

impl Planner {
    pub fn new(model: Arc<dyn LanguageModel>, sequence: Vec<ToolName>) -> Self {
        let system_prompt = system_prompt(&sequence);
        Self {
            model,
            sequence,
            system_prompt,
        }
    }

    pub fn render_prompt(&self, ticket: &Value, scratchpad: &str) -> String {
        format!(
            "{}\nInput ticket JSON:\n{}\n\n{}",
            self.system_prompt, ticket, scratchpad
        )
    }

    pub async fn propose(&self, ticket: &Value, transcript: &Transcript) -> Result<Parsed, ParseFailure> {
        let scratchpad = transcript.render();
        let first = self.ask(&self.render_prompt(ticket, &scratchpad)).await;
        let failure = match first {
            Ok(parsed) => return Ok(parsed),
            Err(failure) => failure,
        };
        warn!("Model reply not usable ({}); re-prompting once", failure);

        let nudged = format!("{}{}", scratchpad, self.nudge());
        let second = self.ask(&self.render_prompt(ticket, &nudged)).await;
        if let Err(failure) = &second {
            warn!("Model reply still not usable after re-prompt: {}", failure);
        }
        second
    }

    async fn ask(&self, prompt: &str) -> Result<Parsed, ParseFailure> {
        let reply = self
            .model
            .complete(prompt)
            .await
            .map_err(|e| ParseFailure::ModelUnavailable(e.to_string()))?;
        debug!("Model turn: {}", preview_for_logs(&reply));
        parse_action(&reply, &self.sequence)
    }

    fn nudge(&self) -> String {
        format!(
            "Your previous message did not include a valid Action / Action Input JSON.\n\
             Respond in EXACTLY this format (no code fences):\n\
             Thought: <your short thought>\n\
             Action: <one of [{}]>\n\
             Action Input: {{\"key\":\"value\"}}\n",
            self.sequence.iter().join(", ")
        )
    }
}

fn system_prompt(sequence: &[ToolName]) -> String {
    let names = sequence.iter().join(", ");
    let order = sequence.iter().join(", then ");
    let tools = sequence
        .iter()
        .map(|t| t.definition().prompt_line())
        .join("\n");

    format!(
        "You are a disciplined ReAct agent that MUST use tools.\n\
         Tools:\n{tools}\n\n\
         Protocol (exactly):\n\
         Thought: describe next step\n\
         Action: one of [{names}]\n\
         Action Input: a single JSON object (no code fences)\n\
         Observation: the tool's JSON result\n\n\
         Hard rules:\n\
         1) Call the tools in this order, once each: {order}.\n\
         2) If any Observation contains {{\"ok\": false, ...}}, STOP.\n\
         3) Pass the subject and body from the latest clean_text Observation to later tools.\n\
         4) create_clickup_task takes {{\"subject\", \"body\", \"pred\"}} where pred is the predict_pipeline result.\n\
         5) Never invent tool names. Always provide valid JSON in Action Input.\n\n\
         Respond in this EXACT template each step (no extra lines):\n\
         Thought: <your short thought>\n\
         Action: <tool name>\n\
         Action Input: {{\"key\": \"value\"}}\n"
    )
}
