//! HTTP tests for the backup API.
//!
//! Every request goes through the real router with `oneshot`; the restarter
//! only counts calls so restores never leave the test process.

#[path = "common.rs"]
mod common;

use axum::body::Body;
use axum::http::{StatusCode, header};
use chrono::Duration;
use common::{TestApp, empty_zip, multipart_body, multipart_content_type, request};
use serde_json::json;
use std::time::Duration as StdDuration;

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_list_requires_superuser() {
    let app = TestApp::new();

    let (status, body) = app
        .send_json(request("GET", "/api/backups", None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["data"], json!({}));

    let record = app.record_token();
    let (status, _) = app
        .send_json(
            request("GET", "/api/backups", Some(&record))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_mutations_require_superuser() {
    let app = TestApp::new();
    app.put_backup("test1.zip").await;
    let record = format!("Bearer {}", app.record_token());

    for (method, uri) in [
        ("POST", "/api/backups"),
        ("DELETE", "/api/backups/test1.zip"),
        ("POST", "/api/backups/test1.zip/restore"),
        ("POST", "/api/files/token"),
    ] {
        for token in [None, Some(record.as_str())] {
            let (status, _) = app
                .send_json(request(method, uri, token).body(Body::empty()).unwrap())
                .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    assert_eq!(app.keys().await, vec!["test1.zip"]);
    assert_eq!(app.restarter.calls(), 0);
}

// ============================================================================
// List and create
// ============================================================================

#[tokio::test]
async fn test_list_empty() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, body) = app
        .send_json(
            request("GET", "/api/backups", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_list_entries_have_key_size_modified() {
    let app = TestApp::new();
    app.put_backup("b.zip").await;
    app.put_backup("a.zip").await;
    let token = app.superuser_token();

    let (status, body) = app
        .send_json(
            request("GET", "/api/backups", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert!(entry["key"].is_string());
        assert_eq!(entry["size"], json!(empty_zip().len()));
        assert!(entry["modified"].is_string());
    }
}

#[tokio::test]
async fn test_create_invalid_name() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, body) = app
        .send_json(
            request("POST", "/api/backups", Some(&token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"!test.zip"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["name"]["code"], "validation_match_invalid");
    assert!(app.keys().await.is_empty());
}

#[tokio::test]
async fn test_create_named_backup() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, _, body) = app
        .send(
            request("POST", "/api/backups", Some(&token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"name":"test.zip"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());
    assert_eq!(app.keys().await, vec!["test.zip"]);
    assert!(!app.backups().coordinator().is_active());
}

#[tokio::test]
async fn test_create_without_body_generates_name() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, _, _) = app
        .send(
            request("POST", "/api/backups", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let keys = app.keys().await;
    assert_eq!(keys.len(), 1);
    assert!(keys[0].starts_with("pb_backup_"));
    assert!(keys[0].ends_with(".zip"));
}

#[tokio::test]
async fn test_create_duplicate_name() {
    let app = TestApp::new();
    app.put_backup("test.zip").await;
    let token = app.superuser_token();

    let (status, body) = app
        .send_json(
            request("POST", "/api/backups", Some(&token))
                .body(Body::from(r#"{"name":"test.zip"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"]["name"]["code"], "validation_backup_name_exists");
}

#[tokio::test]
async fn test_create_rejected_while_lock_held() {
    let app = TestApp::new();
    app.backups().coordinator().force(Some(""));
    let token = app.superuser_token();

    let (status, body) = app
        .send_json(
            request("POST", "/api/backups", Some(&token))
                .body(Body::from(r#"{"name":"test.zip"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["data"], json!({}));
    assert!(app.keys().await.is_empty());
}

#[tokio::test]
async fn test_create_malformed_json() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, _) = app
        .send_json(
            request("POST", "/api/backups", Some(&token))
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.keys().await.is_empty());
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_active_backup_is_rejected() {
    let app = TestApp::new();
    for key in ["test1.zip", "test2.zip", "test3.zip", "@test4.zip"] {
        app.put_backup(key).await;
    }
    app.backups().coordinator().force(Some("test1.zip"));
    let token = app.superuser_token();

    let (status, _) = app
        .send_json(
            request("DELETE", "/api/backups/test1.zip", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.keys().await.len(), 4);

    let (status, _, _) = app
        .send(
            request("DELETE", "/api/backups/%40test4.zip", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let keys = app.keys().await;
    assert!(!keys.contains(&"@test4.zip".to_string()));
    assert_eq!(keys.len(), 3);
}

#[tokio::test]
async fn test_delete_missing_backup() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, _) = app
        .send_json(
            request("DELETE", "/api/backups/missing.zip", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_denied_without_valid_file_token() {
    let app = TestApp::new();
    app.put_backup("test1.zip").await;
    let session = app.superuser_token();

    let expired = app
        .files
        .issue_with_ttl("admin1", Duration::seconds(-60))
        .unwrap();
    let foreign = backupd::auth::FileTokens::new(
        &backupd::auth::FileTokenSecret::new("some-other-secret"),
        Duration::minutes(3),
    )
    .issue("admin1")
    .unwrap();

    let uris = [
        "/api/backups/test1.zip".to_string(),
        "/api/backups/test1.zip?token=".to_string(),
        format!("/api/backups/test1.zip?token={session}"),
        format!("/api/backups/test1.zip?token={expired}"),
        format!("/api/backups/test1.zip?token={foreign}"),
    ];
    for uri in uris {
        let (status, body) = app
            .send_json(request("GET", &uri, None).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body["data"], json!({}));
    }
}

#[tokio::test]
async fn test_download_ignores_authorization_header() {
    let app = TestApp::new();
    app.put_backup("test1.zip").await;
    let session = app.superuser_token();

    let (status, _) = app
        .send_json(
            request("GET", "/api/backups/test1.zip", Some(&session))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_with_file_token() {
    let app = TestApp::new();
    app.put_backup("@test4.zip").await;
    let token = app.file_token();

    let (status, headers, body) = app
        .send(
            request("GET", &format!("/api/backups/%40test4.zip?token={token}"), None)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/zip");
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename*=UTF-8''%40test4%2Ezip"
    );
    assert_eq!(
        headers[header::CONTENT_LENGTH],
        empty_zip().len().to_string().as_str()
    );
    assert_eq!(body.as_ref(), empty_zip().as_slice());
}

#[tokio::test]
async fn test_download_missing_backup() {
    let app = TestApp::new();
    let token = app.file_token();

    let (status, _) = app
        .send_json(
            request("GET", &format!("/api/backups/missing.zip?token={token}"), None)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_file_token_endpoint_issues_download_token() {
    let app = TestApp::new();
    app.put_backup("test1.zip").await;
    let session = app.superuser_token();

    let (status, body) = app
        .send_json(
            request("POST", "/api/files/token", Some(&session))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(
            request("GET", &format!("/api/backups/test1.zip?token={token}"), None)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================================
// Upload
// ============================================================================

fn upload_request(token: &str, body: Vec<u8>) -> axum::http::Request<Body> {
    request("POST", "/api/backups/upload", Some(token))
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_without_file() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let body = multipart_body(&[("name", None, b"test.zip")]);
    let (status, json) = app.send_json(upload_request(&token, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["file"]["code"], "validation_required");

    let (status, _) = app
        .send_json(
            request("POST", "/api/backups/upload", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(app.keys().await.is_empty());
}

#[tokio::test]
async fn test_upload_stores_archive_under_filename() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let zip = empty_zip();
    let body = multipart_body(&[("file", Some("test"), &zip)]);
    let (status, _, _) = app.send(upload_request(&token, body)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.keys().await, vec!["test"]);
}

#[tokio::test]
async fn test_upload_uses_name_field() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let zip = empty_zip();
    let body = multipart_body(&[
        ("name", None, b"renamed.zip"),
        ("file", Some("whatever.zip"), &zip),
    ]);
    let (status, _, _) = app.send(upload_request(&token, body)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.keys().await, vec!["renamed.zip"]);
}

#[tokio::test]
async fn test_upload_duplicate_name() {
    let app = TestApp::new();
    app.put_backup("test").await;
    let token = app.superuser_token();

    let zip = empty_zip();
    let body = multipart_body(&[("file", Some("test"), &zip)]);
    let (status, json) = app.send_json(upload_request(&token, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["file"]["code"], "validation_backup_name_exists");
    assert_eq!(app.keys().await, vec!["test"]);
}

#[tokio::test]
async fn test_upload_rejects_non_zip() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let body = multipart_body(&[("file", Some("notes.zip"), b"plain text, not an archive")]);
    let (status, json) = app.send_json(upload_request(&token, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["data"]["file"].is_object());
    assert!(app.keys().await.is_empty());
}

// ============================================================================
// Restore
// ============================================================================

#[tokio::test]
async fn test_restore_missing_backup() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, _) = app
        .send_json(
            request("POST", "/api/backups/missing.zip/restore", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!app.backups().coordinator().is_active());
}

#[tokio::test]
async fn test_restore_rejected_while_lock_held() {
    let app = TestApp::new();
    app.put_backup("test1.zip").await;
    app.backups().coordinator().force(Some("other.zip"));
    let token = app.superuser_token();

    let (status, _) = app
        .send_json(
            request("POST", "/api/backups/test1.zip/restore", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.restarter.calls(), 0);
}

#[tokio::test]
async fn test_restore_accepted_and_restarts() {
    let app = TestApp::new();
    let token = app.superuser_token();

    let (status, _, _) = app
        .send(
            request("POST", "/api/backups", Some(&token))
                .body(Body::from(r#"{"name":"snap.zip"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = app
        .send(
            request("POST", "/api/backups/snap.zip/restore", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    for _ in 0..100 {
        if app.restarter.calls() > 0 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(50)).await;
    }
    assert_eq!(app.restarter.calls(), 1);

    // The lock stays held until the process is replaced.
    assert_eq!(
        app.backups().coordinator().current().as_deref(),
        Some("snap.zip")
    );
}

#[tokio::test]
async fn test_concurrent_restores_admit_one() {
    let app = TestApp::new();
    let token = app.superuser_token();
    app.backups().create(Some("snap.zip")).await.unwrap();

    let restore = || {
        app.send_json(
            request("POST", "/api/backups/snap.zip/restore", Some(&token))
                .body(Body::empty())
                .unwrap(),
        )
    };
    let ((first, _), (second, _)) = tokio::join!(restore(), restore());

    let mut statuses = [first, second];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::NO_CONTENT, StatusCode::BAD_REQUEST]);

    for _ in 0..100 {
        if app.restarter.calls() > 0 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(50)).await;
    }
    assert_eq!(app.restarter.calls(), 1);
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_reports_active_backup() {
    let app = TestApp::new();

    let (status, body) = app
        .send_json(request("GET", "/api/health", None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["activeBackup"], false);

    app.backups().coordinator().force(Some("test1.zip"));
    let (_, body) = app
        .send_json(request("GET", "/api/health", None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(body["activeBackup"], true);
}

#[tokio::test]
async fn test_metrics_disabled() {
    let app = TestApp::new();
    let (status, _, _) = app
        .send(request("GET", "/metrics", None).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Store failures
// ============================================================================

mod broken_store {
    use async_trait::async_trait;
    use backupd::daemon::services::blob::{
        BlobReader, BlobStore, BlobWriter, MemoryBlobStore, ObjectMeta,
    };
    use std::io;

    pub const DETAIL: &str = "device /dev/sdz1 is full";

    /// Accepts every call except writes, which fail with [`DETAIL`].
    pub struct BrokenStore(pub MemoryBlobStore);

    struct BrokenWriter;

    impl io::Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other(DETAIL))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl BlobWriter for BrokenWriter {
        fn finish(self: Box<Self>) -> anyhow::Result<ObjectMeta> {
            anyhow::bail!(DETAIL)
        }

        fn abort(self: Box<Self>) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl BlobStore for BrokenStore {
        async fn list(&self, prefix: Option<&str>) -> anyhow::Result<Vec<ObjectMeta>> {
            self.0.list(prefix).await
        }

        async fn head(&self, key: &str) -> anyhow::Result<Option<ObjectMeta>> {
            self.0.head(key).await
        }

        async fn writer(&self, _key: &str) -> anyhow::Result<Box<dyn BlobWriter>> {
            Ok(Box::new(BrokenWriter))
        }

        async fn reader(&self, key: &str) -> anyhow::Result<Option<(BlobReader, ObjectMeta)>> {
            self.0.reader(key).await
        }

        async fn delete(&self, key: &str) -> anyhow::Result<bool> {
            self.0.delete(key).await
        }
    }
}

#[tokio::test]
async fn test_create_store_failure_is_opaque_500() {
    use backupd::daemon::services::blob::{BlobService, MemoryBlobStore};
    use broken_store::{BrokenStore, DETAIL};

    let app = TestApp::with_blobs(|_| BlobService::custom(BrokenStore(MemoryBlobStore::new())));
    let token = app.superuser_token();

    let (status, _, raw) = app
        .send(
            request("POST", "/api/backups", Some(&token))
                .body(Body::from(r#"{"name":"test.zip"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!String::from_utf8_lossy(&raw).contains(DETAIL));

    let body: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(
        body["message"],
        "Something went wrong while processing your request."
    );
    assert_eq!(body["data"], json!({}));

    assert!(app.keys().await.is_empty());
    assert!(!app.backups().coordinator().is_active());
}

#[tokio::test]
async fn test_reserved_store_names_are_client_errors() {
    let app = TestApp::on_disk();
    let token = app.superuser_token();

    let zip = empty_zip();
    let body = multipart_body(&[("file", Some("metadata.redb"), &zip)]);
    let (status, json) = app.send_json(upload_request(&token, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["data"]["file"]["code"], "validation_match_invalid");

    let file_token = app.file_token();
    let (status, _) = app
        .send_json(
            request("GET", &format!("/api/backups/metadata.redb?token={file_token}"), None)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for (method, uri) in [
        ("DELETE", "/api/backups/metadata.redb"),
        ("POST", "/api/backups/metadata.redb/restore"),
    ] {
        let (status, _) = app
            .send_json(request(method, uri, Some(&token)).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri}");
    }

    assert!(app.keys().await.is_empty());
    assert_eq!(app.restarter.calls(), 0);
}
