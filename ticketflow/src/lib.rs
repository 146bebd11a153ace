// Ticketflow Library
// Support-ticket intake: agent-planned tool pipeline from free text to a
// populated tracker task.

// Data model and errors
pub mod error;
pub mod types;

// Configuration
pub mod config;

// Pipeline components
pub mod dedup;
pub mod prediction;
pub mod reconcile;
pub mod text_clean;
pub mod tracker;

// Tool surface and control loop
pub mod agent;
pub mod llm;
pub mod tools;

// Entry points
pub mod pipeline;
pub mod service;

// Utilities
pub mod utils;

pub use crate::agent::AgentLoop;
pub use crate::config::TicketflowConfig;
pub use crate::error::{TicketError, TicketResult};
pub use crate::pipeline::Pipeline;
pub use crate::service::SubmissionService;
pub use crate::types::{Prediction, SubmissionResult};
