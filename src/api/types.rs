//! Records exchanged with the ingest worker

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status reported by the worker for the current ingest run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    #[default]
    Idle,
    Running,
    Done,
    Cancelled,
    Error,
}

impl IngestStatus {
    /// Whether the warm-up poll can stop waiting
    pub fn is_underway(&self) -> bool {
        matches!(self, IngestStatus::Running | IngestStatus::Done)
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestStatus::Idle => write!(f, "idle"),
            IngestStatus::Running => write!(f, "running"),
            IngestStatus::Done => write!(f, "done"),
            IngestStatus::Cancelled => write!(f, "cancelled"),
            IngestStatus::Error => write!(f, "error"),
        }
    }
}

/// Point-in-time progress of an ingest run. Owned by the worker; `done <= total`
/// is not enforced here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub done: u64,
    #[serde(default)]
    pub status: IngestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running: Option<bool>,
}

impl ProgressSnapshot {
    /// Snapshot with just a status, handy for fakes and tests
    pub fn with_status(status: IngestStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Display percentage (0-100).
    ///
    /// Uses `done/total` once the worker knows the total; before that a small
    /// placeholder while running so the bar visibly moves.
    pub fn percent(&self) -> f64 {
        if self.total > 0 {
            (self.done as f64 / self.total as f64) * 100.0
        } else if self.running.unwrap_or(false) {
            5.0
        } else {
            0.0
        }
    }

    /// Line of text shown under the progress bar
    pub fn display_note(&self) -> String {
        match self.note.as_deref() {
            Some(note) if !note.is_empty() => note.to_string(),
            _ if self.running.unwrap_or(false) => "Parsing messages…".to_string(),
            _ => "Preparing to ingest…".to_string(),
        }
    }
}

/// Aggregates computed by the worker after an ingest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total: u64,
    pub flagged: u64,
    pub unread: u64,
    pub junk: u64,
    pub unique_senders: u64,
    #[serde(default)]
    pub latest_ts: Option<i64>,
}

/// Email identifiers come back as either integers or strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmailId {
    Number(i64),
    Text(String),
}

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmailId::Number(n) => write!(f, "{n}"),
            EmailId::Text(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: EmailId,
    #[serde(default)]
    pub date_ts: Option<i64>,
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl EmailSummary {
    pub fn subject_or_placeholder(&self) -> &str {
        self.subject
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("(No subject)")
    }

    pub fn sender_or_placeholder(&self) -> &str {
        self.from_email
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or("Unknown sender")
    }
}

/// Body of the start-ingest request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartIngestRequest {
    /// Source kind, e.g. "emlx"
    pub source: String,
    /// Local folder to ingest
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_deserialization_minimal() {
        let json = r#"{"total": 0, "done": 0, "status": "running"}"#;
        let snapshot: ProgressSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.status, IngestStatus::Running);
        assert!(snapshot.note.is_none());
        assert!(snapshot.running.is_none());
    }

    #[test]
    fn test_snapshot_deserialization_full() {
        let json = r#"{
            "kind": "emlx",
            "total": 120,
            "done": 60,
            "status": "running",
            "note": "INBOX.mbox",
            "error": null,
            "running": true
        }"#;
        let snapshot: ProgressSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.kind.as_deref(), Some("emlx"));
        assert_eq!(snapshot.done, 60);
        assert_eq!(snapshot.running, Some(true));
        assert!((snapshot.percent() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let json = r#"{"total": 0, "done": 0, "status": "paused"}"#;
        assert!(serde_json::from_str::<ProgressSnapshot>(json).is_err());
    }

    #[test]
    fn test_percent_placeholder_while_running() {
        let mut snapshot = ProgressSnapshot::with_status(IngestStatus::Running);
        snapshot.running = Some(true);
        assert!((snapshot.percent() - 5.0).abs() < f64::EPSILON);

        snapshot.running = Some(false);
        assert!(snapshot.percent().abs() < f64::EPSILON);
    }

    #[test]
    fn test_display_note() {
        let mut snapshot = ProgressSnapshot::default();
        assert_eq!(snapshot.display_note(), "Preparing to ingest…");

        snapshot.running = Some(true);
        assert_eq!(snapshot.display_note(), "Parsing messages…");

        snapshot.note = Some("Reading Archive.mbox".to_string());
        assert_eq!(snapshot.display_note(), "Reading Archive.mbox");
    }

    #[test]
    fn test_underway_statuses() {
        assert!(IngestStatus::Running.is_underway());
        assert!(IngestStatus::Done.is_underway());
        assert!(!IngestStatus::Cancelled.is_underway());
        assert!(!IngestStatus::Idle.is_underway());
    }

    #[test]
    fn test_email_ids_accept_numbers_and_strings() {
        let json = r#"[
            {"id": 42, "date_ts": 1700000000, "from_email": "a@example.com", "subject": "Hi"},
            {"id": "msg-7", "date_ts": null, "from_email": null, "subject": null}
        ]"#;
        let emails: Vec<EmailSummary> = serde_json::from_str(json).unwrap();
        assert_eq!(emails[0].id, EmailId::Number(42));
        assert_eq!(emails[1].id.to_string(), "msg-7");
        assert_eq!(emails[1].subject_or_placeholder(), "(No subject)");
        assert_eq!(emails[1].sender_or_placeholder(), "Unknown sender");
        assert!(emails[1].snippet.is_none());
    }

    #[test]
    fn test_stats_latest_ts_optional() {
        let json = r#"{"total": 3, "flagged": 1, "unread": 2, "junk": 0, "unique_senders": 2}"#;
        let stats: StatsSummary = serde_json::from_str(json).unwrap();
        assert_eq!(stats.total, 3);
        assert!(stats.latest_ts.is_none());
    }

    #[test]
    fn test_start_request_serialization() {
        let request = StartIngestRequest {
            source: "emlx".to_string(),
            path: "/mail".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"source":"emlx","path":"/mail"}"#);
    }
}
