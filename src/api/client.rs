//! HTTP client for the local ingest worker

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use super::error::{detail_from_body, IngestError, WorkerCall};
use super::types::{EmailSummary, ProgressSnapshot, StartIngestRequest, StatsSummary};
use crate::config::WorkerConfig;

/// Boundary to the ingest worker.
///
/// The wizard only ever talks to the worker through this trait, so tests can
/// swap in a scripted fake.
#[async_trait]
pub trait IngestService: Send + Sync {
    /// Prepare the worker's storage (idempotent on the worker side)
    async fn init_storage(&self) -> Result<(), IngestError>;

    /// Kick off an ingest run. Called at most once per start attempt.
    async fn start_ingest(&self, request: &StartIngestRequest) -> Result<(), IngestError>;

    /// Ask the worker to stop the current run
    async fn cancel_ingest(&self) -> Result<(), IngestError>;

    /// Current progress snapshot
    async fn get_progress(&self) -> Result<ProgressSnapshot, IngestError>;

    /// Aggregates for the ingested mailbox
    async fn get_stats(&self) -> Result<StatsSummary, IngestError>;

    /// Latest emails, most recent first (worker ordering)
    async fn get_emails(&self, limit: u32) -> Result<Vec<EmailSummary>, IngestError>;
}

/// reqwest-backed implementation talking JSON over loopback
pub struct HttpIngestClient {
    client: Client,
    base_url: String,
}

impl HttpIngestClient {
    /// Create a new client with the given base URL
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &WorkerConfig) -> reqwest::Result<Self> {
        Self::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, endpoint))
    }

    /// Send a request and check the status, returning the raw response
    async fn send(
        &self,
        call: WorkerCall,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response, IngestError> {
        let response = builder
            .send()
            .await
            .map_err(|e| IngestError::transport(call, transport_message(&e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(call = call.name(), status = status.as_u16(), "worker returned error");
        Err(IngestError::http(call, status.as_u16(), detail_from_body(&body)))
    }

    /// Send a request whose response body is ignored
    async fn send_unit(&self, call: WorkerCall, builder: RequestBuilder) -> Result<(), IngestError> {
        self.send(call, builder).await.map(|_| ())
    }

    /// Send a request and decode the JSON body
    async fn send_json<R: DeserializeOwned>(
        &self,
        call: WorkerCall,
        builder: RequestBuilder,
    ) -> Result<R, IngestError> {
        let response = self.send(call, builder).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| IngestError::transport(call, transport_message(&e)))?;
        serde_json::from_slice(&bytes).map_err(|e| IngestError::decode(call, e.to_string()))
    }
}

/// Innermost cause of a reqwest error, e.g. "connection refused"
fn transport_message(err: &reqwest::Error) -> String {
    let mut source: &dyn std::error::Error = err;
    while let Some(inner) = source.source() {
        source = inner;
    }
    let message = source.to_string();
    if message.is_empty() {
        err.to_string()
    } else {
        message
    }
}

#[async_trait]
impl IngestService for HttpIngestClient {
    async fn init_storage(&self) -> Result<(), IngestError> {
        self.send_unit(WorkerCall::InitStorage, self.request(Method::POST, "/db/init"))
            .await
    }

    async fn start_ingest(&self, request: &StartIngestRequest) -> Result<(), IngestError> {
        self.send_unit(
            WorkerCall::StartIngest,
            self.request(Method::POST, "/ingest/start").json(request),
        )
        .await
    }

    async fn cancel_ingest(&self) -> Result<(), IngestError> {
        self.send_unit(WorkerCall::CancelIngest, self.request(Method::POST, "/cancel"))
            .await
    }

    async fn get_progress(&self) -> Result<ProgressSnapshot, IngestError> {
        self.send_json(WorkerCall::Progress, self.request(Method::GET, "/progress"))
            .await
    }

    async fn get_stats(&self) -> Result<StatsSummary, IngestError> {
        self.send_json(WorkerCall::Stats, self.request(Method::GET, "/stats"))
            .await
    }

    async fn get_emails(&self, limit: u32) -> Result<Vec<EmailSummary>, IngestError> {
        self.send_json(
            WorkerCall::Emails,
            self.request(Method::GET, &format!("/emails?limit={limit}")),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = HttpIngestClient::new("http://127.0.0.1:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");

        let client = HttpIngestClient::new("http://127.0.0.1:8000", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }

    #[test]
    fn test_from_config() {
        let config = WorkerConfig {
            base_url: "http://localhost:9100/".to_string(),
            request_timeout_secs: 2,
        };
        let client = HttpIngestClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:9100");
    }

    #[tokio::test]
    async fn test_unreachable_worker_is_transport_error() {
        // Port 9 (discard) is essentially never listening on loopback
        let client = HttpIngestClient::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.init_storage().await.unwrap_err();
        assert!(matches!(err, IngestError::Transport { .. }));
        assert_eq!(err.call(), WorkerCall::InitStorage);
        assert!(!err.user_message("fallback").is_empty());
    }
}
