//! In-process ingest worker double for integration tests
//!
//! Serves the worker's HTTP surface on an ephemeral loopback port and records
//! every call it receives. Progress answers follow a script; the last entry
//! repeats once the script runs out.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;

use maillens::api::{
    EmailId, EmailSummary, HttpIngestClient, IngestStatus, ProgressSnapshot, StartIngestRequest,
    StatsSummary,
};

/// A canned failure: status plus raw response body
#[derive(Clone)]
pub struct Failure {
    pub status: StatusCode,
    pub body: String,
}

impl Failure {
    pub fn new(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

#[derive(Default)]
pub struct WorkerScript {
    pub calls: Vec<String>,
    pub start_requests: Vec<StartIngestRequest>,
    pub email_limits: Vec<u32>,
    pub progress: Vec<ProgressSnapshot>,
    pub progress_served: usize,
    pub stats: StatsSummary,
    pub emails: Vec<EmailSummary>,
    pub init_failure: Option<Failure>,
    pub start_failure: Option<Failure>,
    pub cancel_failure: Option<Failure>,
    pub progress_failure: Option<Failure>,
    /// Once cancelled, progress reports `cancelled`
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct WorkerDouble {
    pub addr: SocketAddr,
    script: Arc<Mutex<WorkerScript>>,
}

impl WorkerDouble {
    /// Bind a fresh double and start serving it on the current runtime
    pub async fn spawn() -> Self {
        let script = Arc::new(Mutex::new(WorkerScript::default()));
        let app = Router::new()
            .route("/db/init", post(init_storage))
            .route("/ingest/start", post(start_ingest))
            .route("/cancel", post(cancel_ingest))
            .route("/progress", get(progress))
            .route("/stats", get(stats))
            .route("/emails", get(emails))
            .with_state(script.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, script }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn client(&self) -> HttpIngestClient {
        HttpIngestClient::new(&self.base_url(), Duration::from_secs(5)).unwrap()
    }

    /// Adjust the script
    pub fn script<R>(&self, edit: impl FnOnce(&mut WorkerScript) -> R) -> R {
        edit(&mut self.script.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.script(|s| s.calls.clone())
    }

    pub fn call_count(&self, name: &str) -> usize {
        self.calls().iter().filter(|call| *call == name).count()
    }
}

type Shared = State<Arc<Mutex<WorkerScript>>>;

fn failure_response(failure: Failure) -> Response {
    (failure.status, failure.body).into_response()
}

async fn init_storage(State(script): Shared) -> Response {
    let mut script = script.lock().unwrap();
    script.calls.push("init".to_string());
    match script.init_failure.clone() {
        Some(failure) => failure_response(failure),
        None => Json(serde_json::json!({ "ok": true })).into_response(),
    }
}

async fn start_ingest(State(script): Shared, Json(body): Json<StartIngestRequest>) -> Response {
    let mut script = script.lock().unwrap();
    script.calls.push("start".to_string());
    script.start_requests.push(body);
    match script.start_failure.clone() {
        Some(failure) => failure_response(failure),
        None => Json(serde_json::json!({ "started": true })).into_response(),
    }
}

async fn cancel_ingest(State(script): Shared) -> Response {
    let mut script = script.lock().unwrap();
    script.calls.push("cancel".to_string());
    match script.cancel_failure.clone() {
        Some(failure) => failure_response(failure),
        None => {
            script.cancelled = true;
            Json(serde_json::json!({ "ok": true })).into_response()
        }
    }
}

async fn progress(State(script): Shared) -> Response {
    let mut script = script.lock().unwrap();
    script.calls.push("progress".to_string());
    if let Some(failure) = script.progress_failure.clone() {
        return failure_response(failure);
    }
    if script.cancelled {
        return Json(ProgressSnapshot::with_status(IngestStatus::Cancelled)).into_response();
    }
    let snapshot = match script.progress.get(script.progress_served).cloned() {
        Some(snapshot) => {
            script.progress_served += 1;
            snapshot
        }
        None => script.progress.last().cloned().unwrap_or_default(),
    };
    Json(snapshot).into_response()
}

async fn stats(State(script): Shared) -> Response {
    let mut script = script.lock().unwrap();
    script.calls.push("stats".to_string());
    Json(script.stats.clone()).into_response()
}

#[derive(Deserialize)]
struct EmailsQuery {
    limit: u32,
}

async fn emails(State(script): Shared, Query(query): Query<EmailsQuery>) -> Response {
    let mut script = script.lock().unwrap();
    script.calls.push("emails".to_string());
    script.email_limits.push(query.limit);
    let emails: Vec<EmailSummary> = script
        .emails
        .iter()
        .take(query.limit as usize)
        .cloned()
        .collect();
    Json(emails).into_response()
}

/// A running snapshot with known counts
pub fn running(done: u64, total: u64) -> ProgressSnapshot {
    ProgressSnapshot {
        kind: Some("emlx".to_string()),
        total,
        done,
        status: IngestStatus::Running,
        running: Some(true),
        ..Default::default()
    }
}

/// A finished snapshot
pub fn done(total: u64) -> ProgressSnapshot {
    ProgressSnapshot {
        kind: Some("emlx".to_string()),
        total,
        done: total,
        status: IngestStatus::Done,
        running: Some(false),
        ..Default::default()
    }
}

pub fn email(id: i64, subject: &str) -> EmailSummary {
    EmailSummary {
        id: EmailId::Number(id),
        date_ts: Some(1_700_000_000 + id),
        from_email: Some(format!("sender{id}@example.com")),
        subject: Some(subject.to_string()),
        snippet: None,
    }
}

/// A loopback address with nothing listening on it
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
