//! Best-effort tag attachment. Nothing here fails the submission; tags that
//! cannot be attached are returned so the caller can annotate the task.

use crate::error::TicketResult;
use crate::tracker::{Endpoint, TrackerClient, TrackerError, Verb};
use serde_json::json;
use tracing::{debug, warn};

/// Statuses meaning the space already knows the tag, or does not allow
/// creating it there, but attaching may still work.
const SPACE_TAG_NON_FATAL: &[u16] = &[400, 404, 409, 422];
/// Statuses after which the body form of task tagging is tried.
const PATH_FORM_UNSUPPORTED: &[u16] = &[404, 405];

pub struct TagAttacher<'a> {
    tracker: &'a TrackerClient,
}

impl<'a> TagAttacher<'a> {
    pub fn new(tracker: &'a TrackerClient) -> Self {
        Self { tracker }
    }

    /// Attaches every non-blank tag; returns the ones that failed.
    pub async fn attach_all<'t>(
        &self,
        task_id: &str,
        tags: impl IntoIterator<Item = &'t String>,
    ) -> Vec<String> {
        let mut failed = Vec::new();
        for tag in tags {
            let tag = tag.trim();
            if tag.is_empty() {
                continue;
            }
            if let Err(e) = self.attach(task_id, tag).await {
                warn!("Could not attach tag '{}' to task {}: {}", tag, task_id, e);
                failed.push(tag.to_string());
            }
        }
        failed
    }

    pub async fn attach(&self, task_id: &str, tag: &str) -> TicketResult<()> {
        self.ensure_space_tag(tag).await?;

        let path_form = Endpoint::TaskTag {
            task_id: task_id.to_string(),
            tag: tag.to_string(),
        };
        match self.tracker.request(Verb::Post, &path_form, None).await {
            Ok(_) => {
                debug!("Tagged task {} with '{}'", task_id, tag);
                Ok(())
            }
            Err(e) if e.has_status(PATH_FORM_UNSUPPORTED) => {
                let body_form = Endpoint::TaskTags {
                    task_id: task_id.to_string(),
                };
                self.tracker
                    .request(Verb::Post, &body_form, Some(&json!({ "tags": [tag] })))
                    .await?;
                debug!("Tagged task {} with '{}' (body form)", task_id, tag);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_space_tag(&self, tag: &str) -> TicketResult<()> {
        let endpoint = Endpoint::SpaceTags {
            space_id: self.tracker.space_id().await?,
        };
        let mut last: Option<TrackerError> = None;
        for body in [json!({ "tag": { "name": tag } }), json!({ "name": tag })] {
            match self.tracker.request(Verb::Post, &endpoint, Some(&body)).await {
                Ok(_) => return Ok(()),
                Err(e) if e.has_status(SPACE_TAG_NON_FATAL) => {
                    debug!("Space tag '{}' not created ({}); assuming it exists", tag, e);
                    return Ok(());
                }
                Err(e) => last = Some(e),
            }
        }
        match last {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
