use crate::error::{TicketError, TicketResult};
use crate::tracker::{id_string, TrackerClient};
use crate::types::DropdownOption;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Dropdown options per field id, fetched once per process and never
/// invalidated. Concurrent first lookups of the same field serialise on the
/// lock so the list is fetched once.
#[derive(Default)]
pub struct FieldOptionsCache {
    fields: Mutex<HashMap<String, Arc<Vec<DropdownOption>>>>,
}

impl FieldOptionsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn options(
        &self,
        tracker: &TrackerClient,
        field_id: &str,
    ) -> TicketResult<Arc<Vec<DropdownOption>>> {
        let mut fields = self.fields.lock().await;
        if let Some(cached) = fields.get(field_id) {
            return Ok(cached.clone());
        }

        let listing = tracker.list_fields().await?;
        let options = Arc::new(dropdown_options(&listing, field_id)?);
        debug!(
            "Cached {} options for field {} on list {}",
            options.len(),
            field_id,
            tracker.list_id()
        );
        fields.insert(field_id.to_string(), options.clone());
        Ok(options)
    }
}

/// Extracts the options of a `drop_down` field from a list-fields listing.
pub fn dropdown_options(listing: &Value, field_id: &str) -> TicketResult<Vec<DropdownOption>> {
    let unavailable = |reason: &str| TicketError::FieldUnavailable {
        field_id: field_id.to_string(),
        reason: reason.to_string(),
    };

    let field = listing["fields"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|f| id_string(&f["id"]).as_deref() == Some(field_id))
        .ok_or_else(|| unavailable("not found on list"))?;

    let kind = field["type"].as_str().unwrap_or_default();
    if kind != "drop_down" {
        return Err(unavailable(&format!("type is '{}', expected drop_down", kind)));
    }

    let options = field["type_config"]["options"]
        .as_array()
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(position, raw)| {
            let id = id_string(&raw["id"])?;
            let label = raw["name"]
                .as_str()
                .or_else(|| raw["label"].as_str())
                .unwrap_or_default()
                .to_string();
            let index = raw["orderindex"]
                .as_i64()
                .or_else(|| raw["orderindex"].as_str().and_then(|s| s.parse().ok()))
                .unwrap_or(position as i64);
            Some(DropdownOption::new(id, label).with_index(index))
        })
        .collect::<Vec<_>>();

    if options.is_empty() {
        return Err(unavailable("drop_down has no options"));
    }
    Ok(options)
}
