use crate::error::{TicketError, TicketResult};
use crate::tracker::{Endpoint, TrackerClient, Verb};
use crate::types::DropdownOption;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One request the writer may try.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteAttempt {
    pub verb: Verb,
    pub endpoint: Endpoint,
    pub body: Value,
}

/// Sets a dropdown custom field, trying each accepted value shape against
/// each endpoint form until one returns 2xx. A 2xx is not proof of
/// persistence; see [`super::ConsistencyVerifier`].
pub struct FieldWriter {
    tracker: Arc<TrackerClient>,
}

impl FieldWriter {
    pub fn new(tracker: Arc<TrackerClient>) -> Self {
        Self { tracker }
    }

    pub async fn write(
        &self,
        task_id: &str,
        field_id: &str,
        option: &DropdownOption,
    ) -> TicketResult<WriteAttempt> {
        let attempts = write_attempts(task_id, field_id, option);
        let total = attempts.len();
        let mut last = None;

        for (n, attempt) in attempts.into_iter().enumerate() {
            debug!(
                "Field {} attempt {}/{}: {} {} {}",
                field_id, n + 1, total, attempt.verb, attempt.endpoint, attempt.body
            );
            match self
                .tracker
                .request(attempt.verb, &attempt.endpoint, Some(&attempt.body))
                .await
            {
                Ok(_) => {
                    info!(
                        "Field {} set to '{}' via {} {}",
                        field_id, option.label, attempt.verb, attempt.endpoint
                    );
                    return Ok(attempt);
                }
                Err(e) if e.is_auth() => return Err(e.into()),
                Err(e) => {
                    warn!("Field {} write rejected: {}", field_id, e);
                    last = Some(e);
                }
            }
        }

        Err(TicketError::WriteExhausted {
            field_id: field_id.to_string(),
            attempts: total,
            last,
        })
    }
}

/// Every (endpoint, value shape) pair, value shapes outermost:
/// option id, `{"id"}`, index, label, `{"label"}`.
pub fn write_attempts(task_id: &str, field_id: &str, option: &DropdownOption) -> Vec<WriteAttempt> {
    let mut values = vec![json!(option.id), json!({ "id": option.id })];
    if let Some(index) = option.index {
        values.push(json!(index));
    }
    values.push(json!(option.label));
    values.push(json!({ "label": option.label }));

    let field_endpoint = Endpoint::TaskField {
        task_id: task_id.to_string(),
        field_id: field_id.to_string(),
    };
    let task_endpoint = Endpoint::Task {
        task_id: task_id.to_string(),
    };

    values
        .into_iter()
        .flat_map(|value| {
            [
                WriteAttempt {
                    verb: Verb::Post,
                    endpoint: field_endpoint.clone(),
                    body: json!({ "value": value }),
                },
                WriteAttempt {
                    verb: Verb::Put,
                    endpoint: field_endpoint.clone(),
                    body: json!({ "value": value }),
                },
                WriteAttempt {
                    verb: Verb::Put,
                    endpoint: task_endpoint.clone(),
                    body: json!({ "custom_fields": [{ "id": field_id, "value": value }] }),
                },
            ]
        })
        .collect()
}
