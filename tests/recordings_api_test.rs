//! # Recordings API Tests
//!
//! Runs the real router on an ephemeral port and drives it over HTTP, both with raw
//! `reqwest` requests and through `RecordingsClient`.
//!
//! ```bash
//! cargo test --test recordings_api_test
//! ```

use reqwest::multipart::{Form, Part};
use std::sync::Arc;
use tokio::net::TcpListener;

use screen_recorder::chunk_store::ChunkStore;
use screen_recorder::client::RecordingsClient;
use screen_recorder::errors::UploadError;
use screen_recorder::range::ByteRange;
use screen_recorder::recordings::{
    ListQuery, RecordingCatalog, RecordingLimits, RecordingSummary, SortKey, SortOrder,
};
use screen_recorder::serve::{build_router, AppState};
use screen_recorder::upload::{
    no_progress, upload_with_retry, RetryPolicy, UploadJob, UploadReceipt, UploadRequest,
};

const CHUNK_SIZE: usize = 1000;

struct TestServer {
    url: String,
    pool: sqlx::SqlitePool,
    _guard: tempfile::TempDir,
    _handle: tokio::task::JoinHandle<()>,
}

async fn start_test_server(limits: RecordingLimits) -> TestServer {
    let (pool, guard) = screen_recorder::db::create_test_connection_in_temporary_file()
        .await
        .unwrap();
    screen_recorder::db::init_database_schema(&pool)
        .await
        .unwrap();

    let store = ChunkStore::new(pool.clone(), CHUNK_SIZE);
    let state = Arc::new(AppState {
        catalog: RecordingCatalog::new(store, limits),
    });
    let app = build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let url = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

    TestServer {
        url,
        pool,
        _guard: guard,
        _handle: handle,
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

fn recording_form(data: Vec<u8>, content_type: &str, title: &str, duration: &str) -> Form {
    let size = data.len().to_string();
    let part = Part::bytes(data)
        .file_name("recording.webm")
        .mime_str(content_type)
        .unwrap();
    Form::new()
        .part("recording", part)
        .text("title", title.to_string())
        .text("duration", duration.to_string())
        .text("size", size)
}

async fn upload_raw(server: &TestServer, form: Form) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/recordings", server.url))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn upload_ok(server: &TestServer, data: Vec<u8>, title: &str) -> UploadReceipt {
    let response = upload_raw(server, recording_form(data, "video/webm", title, "12")).await;
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

async fn error_message(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_health() {
    let server = start_test_server(RecordingLimits::default()).await;
    let response = reqwest::get(format!("{}/health", server.url)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_upload_then_range_request_at_the_end() {
    let server = start_test_server(RecordingLimits::default()).await;
    let data = payload(10_000);

    let client = RecordingsClient::new(&server.url).unwrap();
    let mut job = UploadJob::new(UploadRequest {
        data: data.clone().into(),
        title: "Range demo".to_string(),
        duration_secs: 42,
        content_type: "video/webm".to_string(),
        file_name: "demo.webm".to_string(),
    });
    let receipt = upload_with_retry(&client, &mut job, &RetryPolicy::immediate(), no_progress())
        .await
        .unwrap();
    assert_eq!(job.attempts(), 1);
    assert_eq!(receipt.url, format!("/recordings/{}", receipt.id));

    let response = reqwest::Client::new()
        .get(format!("{}{}", server.url, receipt.url))
        .header(reqwest::header::RANGE, "bytes=9990-")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 206);
    let headers = response.headers().clone();
    assert_eq!(headers["content-range"], "bytes 9990-9999/10000");
    assert_eq!(headers["content-length"], "10");
    assert_eq!(headers["accept-ranges"], "bytes");
    assert_eq!(headers["content-type"], "video/webm");
    let body = response.bytes().await.unwrap();
    assert_eq!(body.len(), 10);
    assert_eq!(&body[..], &data[9990..]);
}

#[tokio::test]
async fn test_full_and_ranged_responses() {
    let server = start_test_server(RecordingLimits::default()).await;
    let data = payload(4_321);
    let receipt = upload_ok(&server, data.clone(), "Full").await;
    let client = reqwest::Client::new();
    let url = format!("{}/recordings/{}", server.url, receipt.id);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let headers = response.headers().clone();
    assert_eq!(headers["content-length"], "4321");
    assert_eq!(headers["accept-ranges"], "bytes");
    let disposition = headers["content-disposition"].to_str().unwrap();
    assert!(disposition.starts_with("inline; filename=\"recording-"), "{}", disposition);
    assert!(disposition.ends_with(".webm\""), "{}", disposition);
    assert_eq!(response.bytes().await.unwrap().to_vec(), data);

    // First byte, and a range straddling a chunk boundary
    for (start, end) in [(0usize, 0usize), (995, 1004)] {
        let response = client
            .get(&url)
            .header(reqwest::header::RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 206);
        assert_eq!(
            response.headers()["content-range"],
            format!("bytes {}-{}/4321", start, end).as_str()
        );
        assert_eq!(response.bytes().await.unwrap().to_vec(), &data[start..=end]);
    }
}

#[tokio::test]
async fn test_bad_ranges() {
    let server = start_test_server(RecordingLimits::default()).await;
    let receipt = upload_ok(&server, payload(100), "Ranges").await;
    let client = reqwest::Client::new();
    let url = format!("{}/recordings/{}", server.url, receipt.id);

    let response = client
        .get(&url)
        .header(reqwest::header::RANGE, "bytes=100-")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 416);
    assert_eq!(response.headers()["content-range"], "bytes */100");

    for malformed in ["items=0-10", "bytes=-10", "bytes=abc-", "bytes=0-5,10-20"] {
        let response = client
            .get(&url)
            .header(reqwest::header::RANGE, malformed)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "{}", malformed);
    }

    // Through the client as well
    let client = RecordingsClient::new(&server.url).unwrap();
    let tail = client
        .fetch(receipt.id, Some(ByteRange::new(90, None)))
        .await
        .unwrap();
    assert_eq!(tail.to_vec(), &payload(100)[90..]);
}

#[tokio::test]
async fn test_upload_validation() {
    let limits = RecordingLimits {
        max_size_bytes: 5_000,
        max_duration_secs: 180,
    };
    let server = start_test_server(limits).await;

    let response = upload_raw(
        &server,
        recording_form(payload(10), "application/pdf", "Not a video", "5"),
    )
    .await;
    assert_eq!(response.status(), 400);
    assert!(error_message(response).await.contains("Only video files"));

    let response = upload_raw(&server, recording_form(payload(10), "video/webm", "Long", "181")).await;
    assert_eq!(response.status(), 400);

    let response = upload_raw(&server, recording_form(payload(10), "video/webm", "Bad", "-3")).await;
    assert_eq!(response.status(), 400);

    let response = upload_raw(&server, recording_form(payload(5_001), "video/webm", "Big", "5")).await;
    assert_eq!(response.status(), 400);
    assert!(error_message(response).await.contains("too large"));

    let response = upload_raw(&server, Form::new().text("title", "No file")).await;
    assert_eq!(response.status(), 400);
    assert_eq!(error_message(response).await, "No recording file provided");

    // Validation errors come back typed through the client
    let client = RecordingsClient::new(&server.url).unwrap();
    let mut job = UploadJob::new(UploadRequest {
        data: payload(10).into(),
        title: "Pdf".to_string(),
        duration_secs: 1,
        content_type: "application/pdf".to_string(),
        file_name: "doc.pdf".to_string(),
    });
    let result = upload_with_retry(&client, &mut job, &RetryPolicy::immediate(), no_progress()).await;
    assert!(matches!(result, Err(UploadError::Validation { status: 400, .. })));
    assert_eq!(job.attempts(), 1);

    let listed = client.list(&ListQuery::default()).await.unwrap();
    assert!(listed.is_empty(), "rejected uploads must not be stored");
}

#[tokio::test]
async fn test_body_over_the_transport_limit_is_a_validation_error() {
    let limits = RecordingLimits {
        max_size_bytes: 5_000,
        max_duration_secs: 180,
    };
    let server = start_test_server(limits).await;

    // Larger than the size limit plus the multipart allowance, so the body limit trips first
    let response = upload_raw(
        &server,
        recording_form(payload(3 * 1024 * 1024), "video/webm", "Huge", "5"),
    )
    .await;
    assert_eq!(response.status(), 400);
    assert!(error_message(response).await.contains("too large"));

    let listed = RecordingsClient::new(&server.url)
        .unwrap()
        .list(&ListQuery::default())
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_list_sorting_and_search() {
    let server = start_test_server(RecordingLimits::default()).await;
    let first = upload_ok(&server, payload(300), "Bravo demo").await;
    let second = upload_ok(&server, payload(100), "alpha walkthrough").await;
    let third = upload_ok(&server, payload(200), "Charlie Demo").await;

    let response = reqwest::get(format!("{}/recordings", server.url)).await.unwrap();
    assert_eq!(response.status(), 200);
    let listed: Vec<RecordingSummary> = response.json().await.unwrap();
    let ids: Vec<i64> = listed.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![third.id, second.id, first.id], "newest first by default");
    assert_eq!(listed[0].title, "Charlie Demo");
    assert_eq!(listed[0].size, 200);
    assert_eq!(listed[0].duration, 12);
    assert_eq!(listed[0].content_type, "video/webm");
    assert_eq!(listed[0].url, format!("/recordings/{}", third.id));
    assert!(chrono::DateTime::parse_from_rfc3339(&listed[0].created_at).is_ok());

    let client = RecordingsClient::new(&server.url).unwrap();
    let by_size = client
        .list(&ListQuery {
            sort: SortKey::Size,
            order: SortOrder::Asc,
            search: None,
        })
        .await
        .unwrap();
    let sizes: Vec<u64> = by_size.iter().map(|r| r.size).collect();
    assert_eq!(sizes, vec![100, 200, 300]);

    let demos = client
        .list(&ListQuery {
            sort: SortKey::Title,
            order: SortOrder::Asc,
            search: Some("DEMO".to_string()),
        })
        .await
        .unwrap();
    let titles: Vec<&str> = demos.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Bravo demo", "Charlie Demo"]);

    let response = reqwest::get(format!("{}/recordings?sort=colour", server.url))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_default_title_when_blank() {
    let server = start_test_server(RecordingLimits::default()).await;
    let receipt = upload_ok(&server, payload(10), "   ").await;

    let client = RecordingsClient::new(&server.url).unwrap();
    let listed = client.list(&ListQuery::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, receipt.id);
    assert!(listed[0].title.starts_with("Recording "), "{}", listed[0].title);
}

#[tokio::test]
async fn test_invalid_and_unknown_ids() {
    let server = start_test_server(RecordingLimits::default()).await;
    let client = reqwest::Client::new();

    for id in ["abc", "0", "-1"] {
        let response = client
            .get(format!("{}/recordings/{}", server.url, id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "GET {}", id);

        let response = client
            .delete(format!("{}/recordings/{}", server.url, id))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "DELETE {}", id);
    }

    let response = client
        .get(format!("{}/recordings/999", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(error_message(response).await, "Recording not found");

    let response = client
        .delete(format!("{}/recordings/999", server.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_delete_removes_record_and_chunks() {
    let server = start_test_server(RecordingLimits::default()).await;
    let receipt = upload_ok(&server, payload(2_500), "Short lived").await;
    let client = RecordingsClient::new(&server.url).unwrap();

    let message = client.delete(receipt.id).await.unwrap();
    assert_eq!(message, "Recording deleted successfully");

    assert!(matches!(
        client.fetch(receipt.id, None).await,
        Err(UploadError::Server { status: 404, .. })
    ));
    assert!(matches!(
        client.delete(receipt.id).await,
        Err(UploadError::Server { status: 404, .. })
    ));

    let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(&server.pool)
        .await
        .unwrap();
    let files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM files")
        .fetch_one(&server.pool)
        .await
        .unwrap();
    assert_eq!((chunks, files), (0, 0));
}

#[tokio::test]
async fn test_failed_chunk_deletion_keeps_record() {
    let server = start_test_server(RecordingLimits::default()).await;
    let receipt = upload_ok(&server, payload(2_500), "Keep me").await;

    // Make the chunk removal step fail
    sqlx::query("DROP TABLE chunks")
        .execute(&server.pool)
        .await
        .unwrap();

    let response = reqwest::Client::new()
        .delete(format!("{}/recordings/{}", server.url, receipt.id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(error_message(response).await, "Failed to delete recording");

    let client = RecordingsClient::new(&server.url).unwrap();
    let listed = client.list(&ListQuery::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, receipt.id);
    assert_eq!(listed[0].title, "Keep me");
}

#[tokio::test]
async fn test_bulk_delete_reports_each_id() {
    let server = start_test_server(RecordingLimits::default()).await;
    let a = upload_ok(&server, payload(10), "A").await;
    let b = upload_ok(&server, payload(10), "B").await;

    let client = RecordingsClient::new(&server.url).unwrap();
    let report = client.delete_many(&[a.id, b.id, 12345]).await;

    let mut succeeded = report.succeeded.clone();
    succeeded.sort();
    assert_eq!(succeeded, vec![a.id, b.id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 12345);

    assert!(client.list(&ListQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_search_wildcards_match_literally() {
    let server = start_test_server(RecordingLimits::default()).await;
    upload_ok(&server, payload(10), "plain").await;
    let percent = upload_ok(&server, payload(10), "100% done").await;
    let underscore = upload_ok(&server, payload(10), "snake_case").await;

    for (encoded, expected) in [("%25", percent.id), ("_", underscore.id)] {
        let response = reqwest::get(format!("{}/recordings?search={}", server.url, encoded))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let listed: Vec<RecordingSummary> = response.json().await.unwrap();
        let ids: Vec<i64> = listed.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![expected], "search={}", encoded);
    }
}

#[tokio::test]
async fn test_missing_chunk_set_is_not_found() {
    let server = start_test_server(RecordingLimits::default()).await;
    let receipt = upload_ok(&server, payload(2_500), "Orphaned").await;

    sqlx::query("DELETE FROM chunks")
        .execute(&server.pool)
        .await
        .unwrap();

    let response = reqwest::get(format!("{}/recordings/{}", server.url, receipt.id))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    assert_eq!(error_message(response).await, "Recording data not found");
}

#[tokio::test]
async fn test_damaged_chunk_set_fails_before_headers() {
    let server = start_test_server(RecordingLimits::default()).await;
    let gap = upload_ok(&server, payload(2_500), "Gap").await;
    let short = upload_ok(&server, payload(2_500), "Short").await;

    // One recording loses a middle chunk, the other has a truncated first chunk
    sqlx::query(
        "DELETE FROM chunks WHERE n = 1 AND file_id = (SELECT file_id FROM recordings WHERE id = ?1)",
    )
    .bind(gap.id)
    .execute(&server.pool)
    .await
    .unwrap();
    sqlx::query(
        "UPDATE chunks SET data = x'00' WHERE n = 0 AND file_id = (SELECT file_id FROM recordings WHERE id = ?1)",
    )
    .bind(short.id)
    .execute(&server.pool)
    .await
    .unwrap();

    let client = reqwest::Client::new();
    for id in [gap.id, short.id] {
        for range in [None, Some("bytes=0-99")] {
            let mut request = client.get(format!("{}/recordings/{}", server.url, id));
            if let Some(range) = range {
                request = request.header("Range", range);
            }
            let response = request.send().await.unwrap();
            assert_eq!(response.status(), 500, "id {} range {:?}", id, range);
            assert_eq!(error_message(response).await, "Failed to stream recording");
        }
    }
}

#[tokio::test]
async fn test_storage_failure_on_upload() {
    let server = start_test_server(RecordingLimits::default()).await;

    sqlx::query("DROP TABLE chunks")
        .execute(&server.pool)
        .await
        .unwrap();

    let response = upload_raw(
        &server,
        recording_form(payload(2_500), "video/webm", "Nowhere to go", "5"),
    )
    .await;
    assert_eq!(response.status(), 500);
    assert_eq!(error_message(response).await, "Failed to store recording");

    let listed = RecordingsClient::new(&server.url)
        .unwrap()
        .list(&ListQuery::default())
        .await
        .unwrap();
    assert!(listed.is_empty(), "a failed upload must not leave a record");
}

#[tokio::test]
async fn test_bulk_delete_accounts_for_every_id() {
    let server = start_test_server(RecordingLimits::default()).await;
    let a = upload_ok(&server, payload(10), "Twice").await;

    let client = RecordingsClient::new(&server.url).unwrap();
    let ids = [a.id, a.id];
    let report = client.delete_many(&ids).await;

    assert_eq!(report.succeeded, vec![a.id]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, a.id);
    assert_eq!(report.succeeded.len() + report.failed.len(), ids.len());
}
