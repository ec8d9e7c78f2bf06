//! Tests for the parser-service client against a mock HTTP server.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use evlo::config::{Config, RemoteParserConfig, TransferMode};
use evlo::db::event_repo;
use evlo::pipeline::Upload;
use evlo::source::{PageRequest, RemoteParserClient, StagedUpload};
use evlo::{
    Database, FailureClass, InMemoryStore, IngestError, Orchestrator, ParsingStatus,
    RemoteParsingError, WorkerPool,
};

fn fast_config(url: &str) -> RemoteParserConfig {
    RemoteParserConfig {
        retry_delay_ms: 10,
        ..RemoteParserConfig::new(url)
    }
}

/// Writes a small staged file and returns its descriptor.
fn staged(dir: &TempDir) -> StagedUpload {
    let path: PathBuf = dir.path().join("evlo-upload-1-abc.evtx");
    std::fs::write(&path, b"ElfFile\0payload").unwrap();
    StagedUpload {
        path,
        filename: "Security.evtx".to_string(),
        size: 15,
    }
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(parse_response(vec![
            wire_event(Some(4624), "Information", "Security"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = RemoteParserClient::new(fast_config(&server.uri())).unwrap();
    let outcome = client.parse(&staged(&dir), PageRequest::default()).await.unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].get("eventId"), Some("4624"));
    assert_eq!(outcome.total_count, Some(1));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(ResponseTemplate::new(400).set_body_string("not an evtx file"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = RemoteParserClient::new(fast_config(&server.uri())).unwrap();
    let err = client
        .parse(&staged(&dir), PageRequest::default())
        .await
        .unwrap_err();

    match err {
        RemoteParsingError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "not an evtx file");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_attempts_are_capped_at_three() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = RemoteParserConfig {
        max_attempts: 10,
        ..fast_config(&server.uri())
    };
    let client = RemoteParserClient::new(config).unwrap();
    let err = client
        .parse(&staged(&dir), PageRequest::default())
        .await
        .unwrap_err();

    match &err {
        RemoteParsingError::Exhausted { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(err.upstream_status(), Some(503));
}

#[tokio::test]
async fn test_multipart_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .and(header_regex("content-type", "^multipart/form-data; boundary=.+"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("filename=\"Security.evtx\""))
        .and(body_string_contains("ElfFile"))
        .and(query_param("maxEvents", "50"))
        .and(query_param("offset", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(parse_response(vec![])))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = RemoteParserClient::new(fast_config(&server.uri())).unwrap();
    let page = PageRequest {
        offset: Some(10),
        max_events: Some(50),
    };
    let outcome = client.parse(&staged(&dir), page).await.unwrap();
    assert!(outcome.records.is_empty());
}

#[tokio::test]
async fn test_shared_volume_sends_path_only() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let upload = staged(&dir);

    Mock::given(method("POST"))
        .and(path("/parse"))
        .and(query_param("filePath", upload.path.to_string_lossy().to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(parse_response(vec![
            wire_event(Some(7036), "0", "System"),
            wire_event(Some(7040), "1", "System"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let config = RemoteParserConfig {
        mode: TransferMode::SharedVolume,
        ..fast_config(&server.uri())
    };
    let client = RemoteParserClient::new(config).unwrap();
    let outcome = client.parse(&upload, PageRequest::default()).await.unwrap();
    assert_eq!(outcome.records.len(), 2);
}

#[tokio::test]
async fn test_null_events_reads_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"events": null, "count": 0, "totalCount": 0})),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = RemoteParserClient::new(fast_config(&server.uri())).unwrap();
    let outcome = client.parse(&staged(&dir), PageRequest::default()).await.unwrap();
    assert!(outcome.records.is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"events\": [oops"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let client = RemoteParserClient::new(fast_config(&server.uri())).unwrap();
    let err = client
        .parse(&staged(&dir), PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteParsingError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_service_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(parse_response(vec![]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = RemoteParserConfig {
        timeout_secs: 1,
        max_attempts: 1,
        ..fast_config(&server.uri())
    };
    let client = RemoteParserClient::new(config).unwrap();
    let err = client
        .parse(&staged(&dir), PageRequest::default())
        .await
        .unwrap_err();

    match err {
        RemoteParsingError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, RemoteParsingError::Timeout(_)));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

fn remote_orchestrator(url: &str, staging: &TempDir) -> (Orchestrator, Database) {
    let mut config = Config::default();
    config.worker_count = 2;
    config.upload.temp_dir = Some(staging.path().to_path_buf());
    config.parser.remote = Some(fast_config(url));

    let db = Database::open_in_memory().unwrap();
    let pool = WorkerPool::new(config.worker_count).unwrap();
    let store = Arc::new(InMemoryStore::new(100));
    let orchestrator = Orchestrator::from_config(&config, db.clone(), pool, store).unwrap();
    (orchestrator, db)
}

#[tokio::test]
async fn test_orchestrator_ingests_through_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(parse_response(vec![
            wire_event(Some(4624), "Information", "Security"),
            wire_event(None, "Information", "Security"),
            wire_event(Some(4625), "Warning", "Microsoft-Windows-Security-Auditing/Operational"),
        ])))
        .mount(&server)
        .await;

    let staging = TempDir::new().unwrap();
    let (orchestrator, db) = remote_orchestrator(&server.uri(), &staging);
    assert_eq!(orchestrator.source_name(), "remote");

    let upload = Upload::new("Security.evtx", b"ElfFile\0payload".to_vec());
    let report = orchestrator.ingest(upload).await.unwrap();

    assert_eq!(report.log_file.parsing_status, ParsingStatus::Completed);
    assert_eq!(report.events_persisted, 2);
    assert_eq!(report.records_dropped, 1);
    assert_eq!(event_repo::count_by_log_file(&db, report.log_file.id).unwrap(), 2);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unavailable_service_fails_ingestion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/parse"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let staging = TempDir::new().unwrap();
    let (orchestrator, _db) = remote_orchestrator(&server.uri(), &staging);

    let upload = Upload::new("Security.evtx", b"ElfFile\0payload".to_vec());
    let err = orchestrator.ingest(upload).await.unwrap_err();

    assert!(matches!(err, IngestError::RemoteParsing(_)));
    assert_eq!(err.failure_class(), FailureClass::ServiceUnavailable);
    assert!(err.user_message().contains("contact an administrator"));

    let progress = orchestrator.progress(1).await.unwrap();
    assert_eq!(progress.status, ParsingStatus::Failed);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}
