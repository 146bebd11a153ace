use crate::error::{TicketError, TicketResult};
use crate::tracker::{id_string, TrackerClient};
use crate::types::{DropdownOption, Strictness, WriteOutcome};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Poll interval schedule: `initial`, growing by `step` up to `cap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollBackoff {
    pub initial: Duration,
    pub step: Duration,
    pub cap: Duration,
}

impl Default for PollBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            step: Duration::from_millis(300),
            cap: Duration::from_secs(2),
        }
    }
}

/// Shortest gap between two read-backs.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

impl PollBackoff {
    /// Builds a schedule whose intervals never drop below
    /// [`MIN_POLL_INTERVAL`], even for zero settings.
    pub fn new(initial: Duration, step: Duration, cap: Duration) -> Self {
        let initial = initial.max(MIN_POLL_INTERVAL);
        Self {
            initial,
            step,
            cap: cap.max(initial),
        }
    }

    fn next(&self, current: Duration) -> Duration {
        (current + self.step).min(self.cap)
    }
}

/// Re-reads a task until a field write is visible or the wait budget is spent.
pub struct ConsistencyVerifier {
    tracker: Arc<TrackerClient>,
    backoff: PollBackoff,
}

impl ConsistencyVerifier {
    pub fn new(tracker: Arc<TrackerClient>, backoff: PollBackoff) -> Self {
        Self { tracker, backoff }
    }

    /// Polls never start after `max_wait`, and a read still in flight at
    /// that point is abandoned. Timing out yields
    /// [`WriteOutcome::pending`] in tolerant mode and
    /// [`TicketError::NotPersisted`] in strict mode. Read errors count as
    /// "not visible yet" except auth errors, which propagate.
    pub async fn await_persisted(
        &self,
        task_id: &str,
        field_id: &str,
        expected: &DropdownOption,
        max_wait: Duration,
        strictness: Strictness,
    ) -> TicketResult<WriteOutcome> {
        let started = Instant::now();
        let deadline = started + max_wait;
        let mut interval = self.backoff.initial;
        let mut polls = 0usize;

        loop {
            polls += 1;
            match tokio::time::timeout_at(deadline, self.tracker.get_task(task_id)).await {
                Ok(Ok(task)) => {
                    if field_shows(&task, field_id, expected) {
                        debug!(
                            "Field {} on task {} verified after {} poll(s)",
                            field_id, task_id, polls
                        );
                        return Ok(WriteOutcome::written(Utc::now()));
                    }
                }
                Ok(Err(e)) if e.is_auth() => return Err(e.into()),
                Ok(Err(e)) => debug!("Read-back of task {} failed: {}", task_id, e),
                Err(_) => debug!("Read-back of task {} outlived the wait budget", task_id),
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
            interval = self.backoff.next(interval);
        }

        let waited = started.elapsed().as_secs_f64();
        match strictness {
            Strictness::Strict => Err(TicketError::NotPersisted {
                field_id: field_id.to_string(),
                expected: expected.label.clone(),
                waited_secs: waited,
            }),
            Strictness::Tolerant => {
                warn!(
                    "Field {} on task {} not visible after {:.1}s ({} polls); continuing as pending",
                    field_id, task_id, waited, polls
                );
                Ok(WriteOutcome::pending())
            }
        }
    }
}

/// True when the task's `custom_fields` entry for `field_id` holds `expected`,
/// whether the tracker reports it as an option id, an index, a label, or an
/// object carrying any of those.
pub fn field_shows(task: &Value, field_id: &str, expected: &DropdownOption) -> bool {
    task["custom_fields"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|f| id_string(&f["id"]).as_deref() == Some(field_id))
        .any(|f| value_matches(&f["value"], expected))
}

fn value_matches(value: &Value, expected: &DropdownOption) -> bool {
    let label_matches =
        |s: &str| s.trim().eq_ignore_ascii_case(expected.label.trim()) && !s.trim().is_empty();
    match value {
        Value::String(s) => s == &expected.id || label_matches(s),
        Value::Number(n) => {
            (n.as_i64().is_some() && n.as_i64() == expected.index) || n.to_string() == expected.id
        }
        Value::Object(map) => ["id", "value", "orderindex", "label", "name"]
            .iter()
            .filter_map(|key| map.get(*key))
            .any(|inner| !inner.is_object() && value_matches(inner, expected)),
        _ => false,
    }
}
