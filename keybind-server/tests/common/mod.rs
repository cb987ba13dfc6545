//! Shared helpers for HTTP API tests.

#![allow(dead_code)]

use keybind_license::{BindingEngine, LicenseRecord, MemoryStore, RecordStore};
use keybind_server::{build_router, AppState, FfmpegTransform};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const ADMIN_KEY: &str = "test-admin-key";

pub struct TestServer {
    pub base: String,
    pub store: Arc<MemoryStore>,
    pub client: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// GET `/api/v1/me` as `device`.
    pub async fn me(&self, key: &str, device: &str) -> reqwest::Response {
        self.client
            .get(self.url("/api/v1/me"))
            .header("X-KEY", key)
            .header("X-DEVICE", device)
            .send()
            .await
            .unwrap()
    }

    /// POST `/api/v1/subscribe` with the admin key.
    pub async fn subscribe(&self, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url("/api/v1/subscribe"))
            .header("X-Admin-Key", ADMIN_KEY)
            .form(form)
            .send()
            .await
            .unwrap()
    }

    pub async fn admin_get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .header("X-Admin-Key", ADMIN_KEY)
            .send()
            .await
            .unwrap()
    }
}

/// Spin up the HTTP server over an open memory store holding `records`.
pub async fn spawn_test_server(records: Vec<LicenseRecord>) -> TestServer {
    let store = Arc::new(MemoryStore::with_records(records));
    store.open().await.unwrap();
    spawn_with(store, FfmpegTransform::new("/nonexistent/ffmpeg"), None).await
}

/// Spin up the HTTP server with an explicit store, transform and upload cap.
pub async fn spawn_with(
    store: Arc<MemoryStore>,
    transform: FfmpegTransform,
    max_upload_bytes: Option<u64>,
) -> TestServer {
    let mut state = AppState::new(BindingEngine::new(store.clone()), ADMIN_KEY, transform);
    if let Some(limit) = max_upload_bytes {
        state = state.with_max_upload_bytes(limit);
    }
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer {
        base: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}

/// Writes an executable shell script standing in for ffmpeg.
///
/// Arguments arrive as `-itsscale N -i IN -c:v copy -c:a copy OUT`.
#[cfg(unix)]
pub fn fake_ffmpeg(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ffmpeg");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A fake ffmpeg that copies its input to its output.
#[cfg(unix)]
pub fn copying_ffmpeg() -> (TempDir, FfmpegTransform) {
    let dir = TempDir::new().unwrap();
    let program = fake_ffmpeg(dir.path(), r#"cp "$4" "$9""#);
    (dir, FfmpegTransform::new(program))
}
