//! Integration tests for the HTTP ingest client
//!
//! Each test runs the client against an in-process worker double on a
//! loopback port, so no external worker is needed.

mod common;

use axum::http::StatusCode;

use common::{closed_port_url, done, email, running, Failure, WorkerDouble};
use maillens::api::{
    HttpIngestClient, IngestError, IngestService, IngestStatus, StartIngestRequest, StatsSummary,
    WorkerCall,
};

fn emlx_request(path: &str) -> StartIngestRequest {
    StartIngestRequest {
        source: "emlx".to_string(),
        path: path.to_string(),
    }
}

// ─── Happy Paths ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_start_sends_source_and_path() {
    let worker = WorkerDouble::spawn().await;
    let client = worker.client();

    client.init_storage().await.unwrap();
    client.start_ingest(&emlx_request("/mail")).await.unwrap();

    assert_eq!(worker.calls(), vec!["init", "start"]);
    let requests = worker.script(|s| s.start_requests.clone());
    assert_eq!(requests, vec![emlx_request("/mail")]);
}

#[tokio::test]
async fn test_progress_follows_worker_script() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| s.progress = vec![running(0, 0), running(60, 120), done(120)]);
    let client = worker.client();

    let first = client.get_progress().await.unwrap();
    assert_eq!(first.status, IngestStatus::Running);
    assert_eq!(first.total, 0);

    let second = client.get_progress().await.unwrap();
    assert_eq!((second.done, second.total), (60, 120));
    assert!((second.percent() - 50.0).abs() < f64::EPSILON);

    let third = client.get_progress().await.unwrap();
    assert_eq!(third.status, IngestStatus::Done);

    // The last entry repeats
    let fourth = client.get_progress().await.unwrap();
    assert_eq!(fourth.status, IngestStatus::Done);
}

#[tokio::test]
async fn test_cancel_reaches_worker() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| s.progress = vec![running(10, 100)]);
    let client = worker.client();

    client.cancel_ingest().await.unwrap();

    assert_eq!(worker.call_count("cancel"), 1);
    let snapshot = client.get_progress().await.unwrap();
    assert_eq!(snapshot.status, IngestStatus::Cancelled);
}

#[tokio::test]
async fn test_stats_and_emails() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| {
        s.stats = StatsSummary {
            total: 120,
            flagged: 4,
            unread: 17,
            junk: 2,
            unique_senders: 31,
            latest_ts: Some(1_700_000_500),
        };
        s.emails = (1..=15).map(|id| email(id, "Quarterly report")).collect();
    });
    let client = worker.client();

    let stats = client.get_stats().await.unwrap();
    assert_eq!(stats.total, 120);
    assert_eq!(stats.unique_senders, 31);

    let emails = client.get_emails(10).await.unwrap();
    assert_eq!(emails.len(), 10);
    assert_eq!(emails[0].subject_or_placeholder(), "Quarterly report");
    assert_eq!(worker.script(|s| s.email_limits.clone()), vec![10]);
}

// ─── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_error_carries_string_detail() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| {
        s.start_failure = Some(Failure::new(
            StatusCode::CONFLICT,
            r#"{"detail": "An ingest is already running"}"#,
        ));
    });
    let client = worker.client();

    let err = client.start_ingest(&emlx_request("/mail")).await.unwrap_err();
    match &err {
        IngestError::Http { call, status, .. } => {
            assert_eq!(*call, WorkerCall::StartIngest);
            assert_eq!(*status, 409);
        }
        other => panic!("expected an HTTP error, got {other:?}"),
    }
    assert_eq!(err.detail(), Some("An ingest is already running"));
    assert_eq!(
        err.user_message("Failed to start ingestion"),
        "An ingest is already running"
    );
}

#[tokio::test]
async fn test_http_error_with_structured_detail() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| {
        s.init_failure = Some(Failure::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail": [{"loc": ["body", "path"], "msg": "field required"}]}"#,
        ));
    });
    let client = worker.client();

    let err = client.init_storage().await.unwrap_err();
    let detail = err.detail().unwrap();
    assert!(detail.contains("field required"));
    assert!(detail.starts_with('['));
}

#[tokio::test]
async fn test_http_error_with_plain_text_body() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| {
        s.cancel_failure = Some(Failure::new(StatusCode::INTERNAL_SERVER_ERROR, "worker exploded"));
    });
    let client = worker.client();

    let err = client.cancel_ingest().await.unwrap_err();
    assert_eq!(err.call(), WorkerCall::CancelIngest);
    assert_eq!(err.detail(), Some("worker exploded"));
}

#[tokio::test]
async fn test_http_error_with_empty_body_uses_status() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| s.progress_failure = Some(Failure::new(StatusCode::BAD_GATEWAY, "")));
    let client = worker.client();

    let err = client.get_progress().await.unwrap_err();
    assert_eq!(err.detail(), None);
    assert_eq!(err.user_message("fallback"), "Request failed: 502");
}

#[tokio::test]
async fn test_malformed_progress_is_decode_error() {
    let worker = WorkerDouble::spawn().await;
    worker.script(|s| {
        s.progress_failure = Some(Failure::new(StatusCode::OK, r#"{"status": "exploding"}"#));
    });
    let client = worker.client();

    let err = client.get_progress().await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Decode {
            call: WorkerCall::Progress,
            ..
        }
    ));
}

#[tokio::test]
async fn test_unreachable_worker_reports_cause() {
    let url = closed_port_url().await;
    let client = HttpIngestClient::new(&url, std::time::Duration::from_secs(2)).unwrap();

    let err = client.init_storage().await.unwrap_err();
    assert!(matches!(
        err,
        IngestError::Transport {
            call: WorkerCall::InitStorage,
            ..
        }
    ));
    let message = err.user_message("Failed to start ingestion");
    assert!(
        message.to_lowercase().contains("refused"),
        "unexpected transport message: {message}"
    );
}
