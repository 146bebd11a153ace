//! Duplicate-submission guard.
//!
//! Tickets are keyed by a content hash of the trimmed subject and body. A
//! hash is remembered only once the caller commits a successful submission,
//! so a failed attempt never blocks a legitimate retry. Entries older than
//! the TTL are evicted lazily when they are looked up.
//!
//! The cache is best-effort: two concurrent submissions of the same content
//! can both pass the check before either commits.

use crate::error::TicketResult;
use crate::utils::hash::content_hash;
use crate::utils::{Clock, SystemClock};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// On-disk entry; the file is a plain `hash -> {"ts": unix_seconds}` map.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct DedupRecord {
    ts: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupCheck {
    pub is_duplicate: bool,
    pub hash: String,
}

pub struct DedupGuard {
    /// Backing file; `None` keeps the cache in memory only.
    path: Option<PathBuf>,
    entries: Mutex<HashMap<String, DedupRecord>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DedupGuard {
    pub fn new(path: Option<PathBuf>, ttl: Duration) -> Self {
        Self::with_clock(path, ttl, Arc::new(SystemClock))
    }

    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(None, ttl)
    }

    pub fn with_clock(path: Option<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let entries = path.as_ref().map(Self::load_from_file).unwrap_or_default();
        Self {
            path,
            entries: Mutex::new(entries),
            ttl,
            clock,
        }
    }

    /// An unreadable or corrupt cache file starts an empty cache.
    fn load_from_file(path: &PathBuf) -> HashMap<String, DedupRecord> {
        if !path.exists() {
            return HashMap::new();
        }
        match fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| serde_json::from_str(&content).map_err(|e| e.to_string()))
        {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable dedup cache {}: {}", path.display(), e);
                HashMap::new()
            }
        }
    }

    fn save(&self, entries: &HashMap<String, DedupRecord>) -> TicketResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string(entries)?)?;
        Ok(())
    }

    /// Looks the content up without remembering it.
    pub fn check_and_maybe_remember(&self, subject: &str, body: &str) -> DedupCheck {
        let hash = content_hash(subject, body);
        let now = self.clock.now().timestamp();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let is_duplicate = match entries.get(&hash).copied() {
            None => false,
            Some(record) if now - record.ts > self.ttl.num_seconds() => {
                debug!("Evicting expired dedup entry {}", &hash[..12]);
                entries.remove(&hash);
                if let Err(e) = self.save(&entries) {
                    warn!("Failed to persist dedup eviction: {}", e);
                }
                false
            }
            Some(_) => true,
        };

        if is_duplicate {
            info!("Duplicate ticket detected (hash {})", &hash[..12]);
        }
        DedupCheck { is_duplicate, hash }
    }

    /// Remembers a hash after its task was created.
    pub fn commit(&self, hash: &str) -> TicketResult<()> {
        let now = self.clock.now().timestamp();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(hash.to_string(), DedupRecord { ts: now });
        self.save(&entries)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
