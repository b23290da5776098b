//! Shared harness for the HTTP integration tests.
//!
//! Builds the real router over a temporary data dir and a blob store of the
//! test's choosing, with a restarter that only counts calls.

#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use backupd::auth::{FileTokenSecret, FileTokens, Role, SessionSecret, SessionTokens};
use backupd::daemon::backups::{BackupService, Restarter, StateLayout};
use backupd::daemon::http::{AppState, SharedState, router};
use backupd::daemon::services::blob::BlobService;
use backupd::daemon::services::sqlite::SqliteStore;
use chrono::Duration;
use http_body_util::BodyExt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;

pub const SESSION_SECRET: &str = "test-session-secret";
pub const FILE_SECRET: &str = "test-file-secret";
pub const BOUNDARY: &str = "backupd-test-boundary";

#[derive(Default)]
pub struct RecordingRestarter {
    calls: AtomicUsize,
}

impl RecordingRestarter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Restarter for RecordingRestarter {
    fn restart(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestApp {
    pub state: SharedState,
    pub restarter: Arc<RecordingRestarter>,
    pub sessions: SessionTokens,
    pub files: FileTokens,
    _tmp: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_blobs(|_| BlobService::memory())
    }

    /// Stores backups as files under the temp dir.
    pub fn on_disk() -> Self {
        Self::with_blobs(|root| BlobService::file(root.join("backups")).expect("blob dir"))
    }

    pub fn with_blobs(blobs: impl FnOnce(&Path) -> BlobService) -> Self {
        let tmp = TempDir::new().expect("temp dir");
        let layout = StateLayout::new(tmp.path().join("data"), vec!["data.db".into()], "storage");
        layout.ensure().expect("layout");
        SqliteStore::open(layout.data_dir(), "data.db").expect("store");

        let restarter = Arc::new(RecordingRestarter::default());
        let backups = BackupService::new(blobs(tmp.path()), layout, restarter.clone());

        let sessions = SessionTokens::new(&SessionSecret::new(SESSION_SECRET), Duration::hours(1));
        let files = FileTokens::new(&FileTokenSecret::new(FILE_SECRET), Duration::minutes(3));

        let state = Arc::new(AppState {
            backups,
            sessions: sessions.clone(),
            file_tokens: files.clone(),
            metrics: None,
        });

        Self {
            state,
            restarter,
            sessions,
            files,
            _tmp: tmp,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub fn backups(&self) -> &BackupService {
        &self.state.backups
    }

    pub fn superuser_token(&self) -> String {
        self.sessions.issue("admin1", Role::Superuser).expect("issue")
    }

    pub fn record_token(&self) -> String {
        self.sessions.issue("user1", Role::Record).expect("issue")
    }

    pub fn file_token(&self) -> String {
        self.files.issue("admin1").expect("issue")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
        let response = self.router().oneshot(request).await.expect("request");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        (status, headers, body)
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = self.send(request).await;
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).expect("json body")
        };
        (status, json)
    }

    /// Stores a tiny valid ZIP under `key`, bypassing the API.
    pub async fn put_backup(&self, key: &str) {
        let mut writer = self.backups().blobs().writer(key).await.expect("writer");
        writer.write_all(&empty_zip()).expect("write");
        writer.finish().expect("finish");
    }

    pub async fn keys(&self) -> Vec<String> {
        self.backups()
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|b| b.key)
            .collect()
    }
}

/// End-of-central-directory record of an archive with no entries.
pub fn empty_zip() -> Vec<u8> {
    let mut data = b"PK\x05\x06".to_vec();
    data.extend_from_slice(&[0u8; 18]);
    data
}

pub fn request(method: &str, uri: &str, token: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match token {
        Some(token) => builder.header("Authorization", token),
        None => builder,
    }
}

/// Builds a multipart body from `(field, filename, content)` parts.
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, filename, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}
