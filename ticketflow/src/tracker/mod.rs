//! Remote task-tracker access.
//!
//! [`TrackerTransport`] is the single request seam (`verb`, `endpoint`,
//! optional JSON body). [`TrackerClient`] layers the typed operations the
//! pipeline needs on top of it: task creation, read-back, description
//! annotations and space discovery. Field writes and tag attachment build
//! their own requests in `reconcile`.

pub mod clickup;

use crate::error::{TicketError, TicketResult};
use crate::types::{ExternalTask, Priority};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub use clickup::ClickUpTransport;

const MAX_ERROR_TEXT: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Tasks of a list (create).
    ListTasks { list_id: String },
    /// List metadata (space discovery).
    List { list_id: String },
    /// Custom-field metadata of a list.
    ListFields { list_id: String },
    Task { task_id: String },
    TaskField { task_id: String, field_id: String },
    SpaceTags { space_id: String },
    TaskTag { task_id: String, tag: String },
    TaskTags { task_id: String },
}

impl Endpoint {
    pub fn path(&self) -> String {
        match self {
            Endpoint::ListTasks { list_id } => format!("/list/{}/task", list_id),
            Endpoint::List { list_id } => format!("/list/{}", list_id),
            Endpoint::ListFields { list_id } => format!("/list/{}/field", list_id),
            Endpoint::Task { task_id } => format!("/task/{}", task_id),
            Endpoint::TaskField { task_id, field_id } => {
                format!("/task/{}/field/{}", task_id, field_id)
            }
            Endpoint::SpaceTags { space_id } => format!("/space/{}/tag", space_id),
            Endpoint::TaskTag { task_id, tag } => {
                format!("/task/{}/tag/{}", task_id, urlencoding::encode(tag))
            }
            Endpoint::TaskTags { task_id } => format!("/task/{}/tag", task_id),
        }
    }

    /// Task-scoped endpoints need the custom-task-id query parameters.
    pub fn is_task_scoped(&self) -> bool {
        matches!(
            self,
            Endpoint::Task { .. }
                | Endpoint::TaskField { .. }
                | Endpoint::TaskTag { .. }
                | Endpoint::TaskTags { .. }
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// One failed tracker request.
#[derive(Debug, Clone, Error)]
#[error("HTTP {} {verb} {endpoint}{}", status_label(.status), detail_suffix(.detail))]
pub struct TrackerError {
    pub status: Option<u16>,
    pub verb: Verb,
    pub endpoint: String,
    pub detail: String,
}

fn status_label(status: &Option<u16>) -> String {
    status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "error".to_string())
}

fn detail_suffix(detail: &str) -> String {
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {}", detail)
    }
}

impl TrackerError {
    pub fn new(status: Option<u16>, verb: Verb, endpoint: &Endpoint, detail: impl Into<String>) -> Self {
        let mut detail = detail.into();
        if detail.len() > MAX_ERROR_TEXT {
            let cut = (0..=MAX_ERROR_TEXT)
                .rev()
                .find(|i| detail.is_char_boundary(*i))
                .unwrap_or(0);
            detail.truncate(cut);
            detail.push('…');
        }
        Self {
            status,
            verb,
            endpoint: endpoint.path(),
            detail,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }

    pub fn has_status(&self, statuses: &[u16]) -> bool {
        self.status.map(|s| statuses.contains(&s)).unwrap_or(false)
    }
}

#[async_trait]
pub trait TrackerTransport: Send + Sync {
    /// Sends one request. Any non-2xx answer is an error; an empty 2xx body
    /// is returned as `{}`.
    async fn request(
        &self,
        verb: Verb,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value, TrackerError>;
}

pub struct TrackerClient {
    transport: Arc<dyn TrackerTransport>,
    list_id: String,
    app_url: String,
    space_id: OnceCell<String>,
}

impl TrackerClient {
    pub fn new(transport: Arc<dyn TrackerTransport>, list_id: &str, app_url: &str) -> Self {
        Self {
            transport,
            list_id: list_id.to_string(),
            app_url: app_url.trim_end_matches('/').to_string(),
            space_id: OnceCell::new(),
        }
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub async fn request(
        &self,
        verb: Verb,
        endpoint: &Endpoint,
        body: Option<&Value>,
    ) -> Result<Value, TrackerError> {
        self.transport.request(verb, endpoint, body).await
    }

    pub async fn create_task(
        &self,
        name: &str,
        description: &str,
        priority: Priority,
    ) -> TicketResult<ExternalTask> {
        let endpoint = Endpoint::ListTasks {
            list_id: self.list_id.clone(),
        };
        let payload = json!({
            "name": name,
            "description": description,
            "priority": priority.tracker_level(),
        });
        let raw = self.request(Verb::Post, &endpoint, Some(&payload)).await?;
        let task = external_task_from_response(&raw, &self.app_url)?;
        info!("Created task {} ({})", task.id, task.url);
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Value, TrackerError> {
        let endpoint = Endpoint::Task {
            task_id: task_id.to_string(),
        };
        self.request(Verb::Get, &endpoint, None).await
    }

    pub async fn update_description(
        &self,
        task_id: &str,
        description: &str,
    ) -> Result<(), TrackerError> {
        let endpoint = Endpoint::Task {
            task_id: task_id.to_string(),
        };
        self.request(Verb::Put, &endpoint, Some(&json!({ "description": description })))
            .await
            .map(|_| ())
    }

    pub async fn list_fields(&self) -> Result<Value, TrackerError> {
        let endpoint = Endpoint::ListFields {
            list_id: self.list_id.clone(),
        };
        self.request(Verb::Get, &endpoint, None).await
    }

    /// Space that owns the configured list, resolved once per client.
    pub async fn space_id(&self) -> TicketResult<String> {
        self.space_id
            .get_or_try_init(|| async {
                let endpoint = Endpoint::List {
                    list_id: self.list_id.clone(),
                };
                let data = self.request(Verb::Get, &endpoint, None).await?;
                let space_id = id_string(&data["space"]["id"])
                    .or_else(|| id_string(&data["list"]["space"]["id"]))
                    .ok_or_else(|| {
                        TicketError::Tracker(TrackerError::new(
                            None,
                            Verb::Get,
                            &endpoint,
                            "could not resolve space.id from list",
                        ))
                    })?;
                debug!("List {} belongs to space {}", self.list_id, space_id);
                Ok::<String, TicketError>(space_id)
            })
            .await
            .cloned()
    }

    /// Appends a note to the task description.
    pub async fn append_note(&self, task_id: &str, note: &str) -> TicketResult<()> {
        let task = self.get_task(task_id).await?;
        let current = task["description"].as_str().unwrap_or_default().trim_end();
        let description = if current.is_empty() {
            note.trim_start_matches('\n').to_string()
        } else {
            format!("{}{}", current, note)
        };
        self.update_description(task_id, &description).await?;
        Ok(())
    }
}

/// Note recording how a predicted dropdown value was applied.
pub fn field_note(field_label: &str, predicted: &str, chosen: &str, pending: bool) -> String {
    format!(
        "\n\n---\n**Predicted {}:** \"{}\" → set to **{}**{}",
        field_label,
        predicted.trim(),
        chosen,
        if pending { " (pending verification)" } else { "" }
    )
}

/// Note listing predicted tags that could not be attached.
pub fn tags_note<'a>(tags: impl IntoIterator<Item = &'a String>) -> Option<String> {
    use itertools::Itertools;

    let listed = tags
        .into_iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .sorted()
        .dedup()
        .join(", ");
    if listed.is_empty() {
        None
    } else {
        Some(format!("\n\n---\n**Predicted tags (ML):** {}", listed))
    }
}

/// Ids arrive as strings or numbers depending on the endpoint.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalises a task-creation response: unwraps a `task` wrapper, accepts a
/// bare id string, and synthesizes the link when `url` is missing.
pub fn external_task_from_response(raw: &Value, app_url: &str) -> TicketResult<ExternalTask> {
    let task = match raw {
        Value::Object(map) if map.contains_key("task") => &raw["task"],
        _ => raw,
    };

    let id = match task {
        Value::Object(_) => id_string(&task["id"]),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ Value::Object(_)) => {
                return external_task_from_response(&parsed, app_url);
            }
            _ => id_string(task),
        },
        Value::Number(_) => id_string(task),
        _ => None,
    };
    let id = id.ok_or_else(|| TicketError::CreateShape(json_kind(raw).to_string()))?;

    let url = task["url"]
        .as_str()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/{}", app_url.trim_end_matches('/'), id));
    Ok(ExternalTask { id, url })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: &str = "https://app.clickup.com/t";

    #[test]
    fn create_response_shapes_are_normalised() {
        let direct = external_task_from_response(
            &json!({"id": "86c5", "url": "https://app.clickup.com/t/86c5"}),
            APP,
        )
        .unwrap();
        assert_eq!(direct.id, "86c5");

        let wrapped = external_task_from_response(&json!({"task": {"id": 42}}), APP).unwrap();
        assert_eq!(wrapped.id, "42");
        assert_eq!(wrapped.url, "https://app.clickup.com/t/42");

        let bare = external_task_from_response(&json!("abc123"), APP).unwrap();
        assert_eq!(bare.id, "abc123");

        let err = external_task_from_response(&json!({"err": "nope"}), APP).unwrap_err();
        assert_eq!(
            err.reason("create_task"),
            "clickup_failed: create_task_return_shape: object"
        );
    }

    #[test]
    fn tag_endpoint_is_url_encoded() {
        let endpoint = Endpoint::TaskTag {
            task_id: "t1".to_string(),
            tag: "VPN / Remote".to_string(),
        };
        assert_eq!(endpoint.path(), "/task/t1/tag/VPN%20%2F%20Remote");
        assert!(endpoint.is_task_scoped());
        assert!(!Endpoint::SpaceTags { space_id: "s".into() }.is_task_scoped());
    }

    #[test]
    fn notes_render_like_the_tracker_expects() {
        assert_eq!(
            field_note("Type", "Incidnt", "Incident", false),
            "\n\n---\n**Predicted Type:** \"Incidnt\" → set to **Incident**"
        );
        assert!(field_note("Department", "IT", "IT", true).ends_with("(pending verification)"));

        let tags = vec!["b".to_string(), "a".to_string(), "b".to_string(), " ".to_string()];
        assert_eq!(
            tags_note(&tags).unwrap(),
            "\n\n---\n**Predicted tags (ML):** a, b"
        );
        assert!(tags_note(&Vec::<String>::new()).is_none());
    }

    #[test]
    fn auth_errors_are_recognised() {
        let endpoint = Endpoint::Task { task_id: "t".into() };
        assert!(TrackerError::new(Some(401), Verb::Get, &endpoint, "").is_auth());
        assert!(!TrackerError::new(Some(404), Verb::Get, &endpoint, "").is_auth());
        let long = TrackerError::new(Some(500), Verb::Get, &endpoint, "x".repeat(5000));
        assert!(long.detail.chars().count() <= MAX_ERROR_TEXT + 1);
    }
}
