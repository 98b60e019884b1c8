//! Errors raised by the ingest worker boundary

use thiserror::Error;

/// Which boundary call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerCall {
    InitStorage,
    StartIngest,
    CancelIngest,
    Progress,
    Stats,
    Emails,
}

impl WorkerCall {
    pub fn name(&self) -> &'static str {
        match self {
            WorkerCall::InitStorage => "init_storage",
            WorkerCall::StartIngest => "start_ingest",
            WorkerCall::CancelIngest => "cancel_ingest",
            WorkerCall::Progress => "progress",
            WorkerCall::Stats => "stats",
            WorkerCall::Emails => "emails",
        }
    }
}

/// Errors that can occur when talking to the ingest worker
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// Worker unreachable, connection reset, timeout
    #[error("{message}")]
    Transport { call: WorkerCall, message: String },
    /// Worker answered with a non-success status
    #[error("Request failed: {status}")]
    Http {
        call: WorkerCall,
        status: u16,
        /// Structured `detail` from the response body, if any
        detail: Option<String>,
    },
    /// Response body did not match the expected shape
    #[error("Invalid response from worker: {message}")]
    Decode { call: WorkerCall, message: String },
}

impl IngestError {
    /// Create a transport error
    pub fn transport(call: WorkerCall, message: impl Into<String>) -> Self {
        IngestError::Transport {
            call,
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http(call: WorkerCall, status: u16, detail: Option<String>) -> Self {
        IngestError::Http {
            call,
            status,
            detail,
        }
    }

    /// Create a decode error
    pub fn decode(call: WorkerCall, message: impl Into<String>) -> Self {
        IngestError::Decode {
            call,
            message: message.into(),
        }
    }

    /// The boundary call this error came from
    pub fn call(&self) -> WorkerCall {
        match self {
            IngestError::Transport { call, .. } => *call,
            IngestError::Http { call, .. } => *call,
            IngestError::Decode { call, .. } => *call,
        }
    }

    /// Structured detail carried by the error, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            IngestError::Http { detail, .. } => detail.as_deref().filter(|d| !d.is_empty()),
            _ => None,
        }
    }

    /// Human-readable message for the wizard: detail first, then the error's own
    /// message, then `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        if let Some(detail) = self.detail() {
            return detail.to_string();
        }
        let message = self.to_string();
        if message.trim().is_empty() {
            fallback.to_string()
        } else {
            message
        }
    }
}

/// Extract the `detail` of an error body.
///
/// FastAPI-style bodies carry `{"detail": ...}`; a string detail is used as-is,
/// any other JSON detail is re-serialized, and a non-JSON body is used verbatim.
pub fn detail_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Null) | None => Some(trimmed.to_string()),
            Some(other) => Some(other.to_string()),
        },
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => Some(trimmed.to_string()),
    }
}
