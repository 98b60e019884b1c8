//! Persisted workspace records: connected sources and onboarding status

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

/// Source kind assumed when a persisted entry doesn't say
pub const DEFAULT_SOURCE_KIND: &str = "emlx";

/// One connected mailbox origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    pub total_emails: u64,
    /// Epoch milliseconds of the last completed ingest
    pub last_ingest_ts: i64,
}

impl AppSource {
    /// Short label for listings: the last path component
    pub fn label(&self) -> &str {
        self.path
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .last()
            .unwrap_or(&self.path)
    }
}

/// Workspace-wide metadata, one per installation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMeta {
    pub first_run_complete: bool,
    pub sources: Vec<AppSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_source: Option<String>,
}

/// What the wizard knows when the user presses finish
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCommit {
    pub path: String,
    pub kind: String,
    pub total_emails: u64,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl AppMeta {
    /// Parse a persisted document leniently.
    ///
    /// Returns `None` when the document isn't JSON or isn't an object. Source
    /// entries that can't be used are dropped one by one; the rest keep their
    /// order. A dangling `active_source` is cleared.
    pub fn from_persisted(raw: &str) -> Option<Self> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to parse persisted app meta: {}", e);
                return None;
            }
        };
        let Value::Object(map) = value else {
            warn!("Persisted app meta is not an object, ignoring");
            return None;
        };

        let sources: Vec<AppSource> = match map.get("sources") {
            Some(Value::Array(entries)) => {
                let parsed: Vec<AppSource> =
                    entries.iter().filter_map(source_from_value).collect();
                if parsed.len() != entries.len() {
                    warn!(
                        "Dropped {} malformed source entries from app meta",
                        entries.len() - parsed.len()
                    );
                }
                parsed
            }
            _ => Vec::new(),
        };

        let mut meta = AppMeta {
            first_run_complete: map.get("first_run_complete").is_some_and(truthy),
            sources,
            active_source: map
                .get("active_source")
                .and_then(Value::as_str)
                .map(str::to_string),
        };

        if let Some(active) = meta.active_source.as_deref() {
            if meta.source_by_id(active).is_none() {
                warn!("Active source {} no longer exists, clearing", active);
                meta.active_source = None;
            }
        }

        Some(meta)
    }

    pub fn source_by_id(&self, id: &str) -> Option<&AppSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// The source currently powering the dashboard
    pub fn active(&self) -> Option<&AppSource> {
        self.active_source
            .as_deref()
            .and_then(|id| self.source_by_id(id))
    }

    /// Insert or update the source for `commit.path` and make it active.
    ///
    /// An existing entry keeps its id and position. Returns the id.
    pub fn upsert_source(&mut self, commit: &SourceCommit) -> String {
        let id = if let Some(existing) = self.sources.iter_mut().find(|s| s.path == commit.path) {
            existing.kind = commit.kind.clone();
            existing.total_emails = commit.total_emails;
            existing.last_ingest_ts = commit.timestamp;
            existing.id.clone()
        } else {
            let id = self.fresh_id();
            self.sources.push(AppSource {
                id: id.clone(),
                kind: commit.kind.clone(),
                path: commit.path.clone(),
                total_emails: commit.total_emails,
                last_ingest_ts: commit.timestamp,
            });
            id
        };

        self.first_run_complete = true;
        self.active_source = Some(id.clone());
        id
    }

    /// Point `active_source` at an existing entry. Returns false for unknown ids.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.source_by_id(id).is_none() {
            return false;
        }
        self.active_source = Some(id.to_string());
        true
    }

    fn fresh_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if self.source_by_id(&id).is_none() {
                return id;
            }
        }
    }
}

/// Build a source from one persisted entry, or `None` if it's unusable
fn source_from_value(value: &Value) -> Option<AppSource> {
    let entry = value.as_object()?;
    let id = entry.get("id")?.as_str().filter(|id| !id.is_empty())?;
    let path = entry.get("path")?.as_str()?;
    let kind = entry
        .get("type")
        .and_then(Value::as_str)
        .filter(|k| !k.is_empty())
        .unwrap_or(DEFAULT_SOURCE_KIND);

    Some(AppSource {
        id: id.to_string(),
        kind: kind.to_string(),
        path: path.to_string(),
        total_emails: coerce_number(entry.get("total_emails")).max(0.0) as u64,
        last_ingest_ts: coerce_number(entry.get("last_ingest_ts")) as i64,
    })
}

/// Numbers or numeric strings; anything else counts as zero
fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() {
        n.trunc()
    } else {
        0.0
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
