//! Batch uploader against a mock ingestion endpoint: partitioning, request
//! shape, retry contract, and the any-batch-succeeds aggregation policy.

mod common;

use chrono::Duration as ChronoDuration;
use common::{at, closed_endpoint, dropping_endpoint, MockServer};
use health_sync::error::SyncError;
use health_sync::models::{CanonicalDataPoint, Metadata, SyncResult};
use health_sync::retry::RetryPolicy;
use health_sync::upload::{BatchUploader, UploadSettings};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn points(n: usize) -> Vec<CanonicalDataPoint> {
    (0..n)
        .map(|i| CanonicalDataPoint {
            data_type: "stepCount".into(),
            value: i as f64,
            timestamp: at(0, 0) + ChronoDuration::seconds(i as i64),
            unit: "count".into(),
            source_name: "Phone".into(),
            source_version: "17.4".into(),
            device: String::new(),
            metadata: Metadata::new(),
        })
        .collect()
}

fn uploader(batch_size: usize, retry: RetryPolicy) -> BatchUploader {
    BatchUploader::new(
        "tenant-42",
        UploadSettings {
            batch_size,
            retry,
            timeout: Duration::from_secs(5),
        },
    )
    .unwrap()
}

fn quick_retry() -> RetryPolicy {
    RetryPolicy::fixed(3, Duration::from_millis(10))
}

#[tokio::test]
async fn uploads_every_point_in_bounded_batches() {
    let server = MockServer::ingest(|_| (200, json!({ "accepted": true }))).await;

    let result = uploader(500, quick_retry())
        .upload(&points(1200), "tok-1", &server.base_url)
        .await
        .unwrap();

    assert_eq!(
        result,
        SyncResult {
            total_batches: 3,
            successful_batches: 3,
            failed_batches: 0,
            total_records: 1200,
        }
    );

    let requests = server.requests_to("/ingest");
    assert_eq!(requests.len(), 3);

    let mut seen = Vec::new();
    let mut request_ids = HashSet::new();
    for req in &requests {
        assert_eq!(req.header("authorization"), "Bearer tok-1");
        assert_eq!(req.header("content-type"), "application/json");
        assert!(uuid::Uuid::parse_str(&req.header("x-request-id")).is_ok());
        request_ids.insert(req.header("x-request-id"));

        assert_eq!(req.body["tenant_id"], "tenant-42");
        let batch = req.body["data_points"].as_array().unwrap();
        assert!(batch.len() <= 500);
        seen.extend(batch.iter().map(|p| p["value"].as_f64().unwrap() as usize));
    }
    assert_eq!(request_ids.len(), 3);
    seen.sort_unstable();
    assert_eq!(seen, (0..1200).collect::<Vec<_>>());
}

#[tokio::test]
async fn wire_format_matches_ingest_schema() {
    let server = MockServer::ingest(|_| (200, json!({}))).await;
    let mut pts = points(2);
    pts[1].metadata.insert("total_energy_kcal".into(), 0.0.into());

    uploader(500, quick_retry())
        .upload(&pts, "tok", &server.base_url)
        .await
        .unwrap();

    let requests = server.requests_to("/ingest");
    let body = &requests[0].body;
    let first = &body["data_points"][0];
    assert_eq!(first["timestamp"], "2024-05-01T00:00:00.000Z");
    assert_eq!(first["data_type"], "stepCount");
    assert_eq!(first["unit"], "count");
    assert_eq!(first["source_version"], "17.4");
    assert_eq!(first["device"], "");
    assert!(first.get("metadata").is_none());
    assert_eq!(body["data_points"][1]["metadata"]["total_energy_kcal"], 0.0);
}

#[tokio::test]
async fn unauthorized_fails_after_one_attempt() {
    let server = MockServer::ingest(|_| (401, json!({ "message": "expired" }))).await;

    let err = uploader(500, quick_retry())
        .upload(&points(10), "stale", &server.base_url)
        .await
        .unwrap_err();

    assert_eq!(err, SyncError::AuthenticationError);
    assert_eq!(server.requests_to("/ingest").len(), 1);
}

#[tokio::test]
async fn forbidden_fails_after_one_attempt() {
    let server =
        MockServer::ingest(|_| (403, json!({ "message": "tenant not allowed" }))).await;

    let err = uploader(500, quick_retry())
        .upload(&points(10), "tok", &server.base_url)
        .await
        .unwrap_err();

    assert_eq!(err, SyncError::ForbiddenError("tenant not allowed".into()));
    assert_eq!(server.requests_to("/ingest").len(), 1);
}

#[tokio::test]
async fn other_client_errors_fail_immediately_with_body_detail() {
    let server = MockServer::ingest(|_| (422, json!({ "detail": "unknown data_type" }))).await;

    let err = uploader(500, quick_retry())
        .upload(&points(3), "tok", &server.base_url)
        .await
        .unwrap_err();

    assert_eq!(err, SyncError::UnknownError("unknown data_type".into()));
    assert_eq!(server.requests_to("/ingest").len(), 1);
}

#[tokio::test]
async fn server_error_is_retried_four_times_two_seconds_apart() {
    let server = MockServer::ingest(|_| (500, json!({}))).await;

    let err = uploader(500, RetryPolicy::default())
        .upload(&points(5), "tok", &server.base_url)
        .await
        .unwrap_err();

    assert_eq!(err, SyncError::UnknownError("HTTP 500".into()));

    let requests = server.requests_to("/ingest");
    assert_eq!(requests.len(), 4);
    for pair in requests.windows(2) {
        assert!(pair[1].at.duration_since(pair[0].at) >= Duration::from_secs(2));
    }
    let ids: HashSet<String> = requests.iter().map(|r| r.header("x-request-id")).collect();
    assert_eq!(ids.len(), 4, "each attempt needs a fresh request id");
}

#[tokio::test]
async fn transient_server_error_recovers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let server = MockServer::ingest(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            (503, json!({ "message": "warming up" }))
        } else {
            (200, json!({}))
        }
    })
    .await;

    let result = uploader(500, quick_retry())
        .upload(&points(4), "tok", &server.base_url)
        .await
        .unwrap();

    assert_eq!(result.successful_batches, 1);
    assert_eq!(server.requests_to("/ingest").len(), 3);
}

#[tokio::test]
async fn one_delivered_batch_makes_the_upload_succeed() {
    // Batch 0 is accepted; batches 1 and 2 always get 500.
    let server = MockServer::ingest(|body| {
        if body["data_points"][0]["value"].as_f64() == Some(0.0) {
            (200, json!({}))
        } else {
            (500, json!({ "message": "db down" }))
        }
    })
    .await;

    let result = uploader(2, quick_retry())
        .upload(&points(6), "tok", &server.base_url)
        .await
        .unwrap();

    assert_eq!(
        result,
        SyncResult {
            total_batches: 3,
            successful_batches: 1,
            failed_batches: 2,
            total_records: 6,
        }
    );

    let requests = server.requests_to("/ingest");
    assert_eq!(requests.iter().filter(|r| r.first_value() == 0.0).count(), 1);
    assert_eq!(requests.iter().filter(|r| r.first_value() == 2.0).count(), 4);
    assert_eq!(requests.iter().filter(|r| r.first_value() == 4.0).count(), 4);
}

#[tokio::test]
async fn every_batch_failing_fails_the_upload() {
    let server = MockServer::ingest(|_| (500, json!({ "message": "db down" }))).await;

    let err = uploader(2, RetryPolicy::fixed(1, Duration::from_millis(5)))
        .upload(&points(5), "tok", &server.base_url)
        .await
        .unwrap_err();

    assert_eq!(err, SyncError::UnknownError("db down".into()));
    assert_eq!(server.requests_to("/ingest").len(), 3 * 2);
}

#[tokio::test]
async fn connection_failures_are_retried_then_reported() {
    let (endpoint, accepted) = dropping_endpoint().await;

    let err = uploader(500, RetryPolicy::fixed(3, Duration::from_millis(5)))
        .upload(&points(3), "tok", &endpoint)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NetworkError(_)), "got {:?}", err);
    assert_eq!(accepted.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let endpoint = closed_endpoint().await;

    let err = uploader(500, RetryPolicy::fixed(1, Duration::from_millis(5)))
        .upload(&points(3), "tok", &endpoint)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::NetworkError(_)), "got {:?}", err);
}

#[tokio::test]
async fn nothing_to_upload_is_an_empty_success() {
    let server = MockServer::ingest(|_| (500, json!({}))).await;

    let result = uploader(500, quick_retry())
        .upload(&[], "tok", &server.base_url)
        .await
        .unwrap();

    assert_eq!(result.total_batches, 0);
    assert_eq!(result.total_records, 0);
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn malformed_endpoint_is_rejected() {
    let err = uploader(500, quick_retry())
        .upload(&points(1), "tok", "definitely not a url")
        .await
        .unwrap_err();
    assert_eq!(err, SyncError::InvalidEndpoint);
}
