//! HTTP API for keybind: license checks, key issuance and media processing.

pub mod config;
pub mod error;
pub mod transform;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, FromRequestParts, Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use keybind_license::{
    BindingEngine, DeviceFingerprint, LicenseRecord, LicenseView, RecordEntry, RecordFilter,
    DEFAULT_DURATION_DAYS,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use error::ApiError;
pub use transform::{FfmpegTransform, TransformError};

pub const KEY_HEADER: &str = "X-KEY";
pub const DEVICE_HEADER: &str = "X-DEVICE";
pub const DEVICE_NAME_HEADER: &str = "X-DEVICE-NAME";
pub const ADMIN_KEY_HEADER: &str = "X-Admin-Key";

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 200 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<BindingEngine>,
    admin_key: Arc<str>,
    transform: Arc<FfmpegTransform>,
    max_upload_bytes: u64,
}

impl AppState {
    pub fn new(engine: BindingEngine, admin_key: &str, transform: FfmpegTransform) -> Self {
        Self {
            engine: Arc::new(engine),
            admin_key: Arc::from(admin_key),
            transform: Arc::new(transform),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: u64) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn engine(&self) -> &BindingEngine {
        &self.engine
    }
}

/// Caller identity presented on user routes.
struct Credentials {
    key: String,
    fingerprint: DeviceFingerprint,
    device_name: Option<String>,
}

impl Credentials {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let key = header_str(headers, KEY_HEADER).ok_or(ApiError::MissingCredentials)?;
        let device = header_str(headers, DEVICE_HEADER).ok_or(ApiError::MissingCredentials)?;
        Ok(Self {
            key: key.to_string(),
            fingerprint: DeviceFingerprint::from_device_info(device),
            device_name: header_str(headers, DEVICE_NAME_HEADER).map(str::to_string),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Guard for operator routes: the request carries the configured admin key.
pub struct AdminAccess;

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match header_str(&parts.headers, ADMIN_KEY_HEADER) {
            Some(presented) if presented == &*state.admin_key => Ok(Self),
            _ => {
                warn!("Rejected admin request to {}", parts.uri.path());
                Err(ApiError::AdminRequired)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscribeForm {
    pub key: String,
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,
}

fn default_duration_days() -> u32 {
    DEFAULT_DURATION_DAYS
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub message: String,
    pub record: LicenseRecord,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub status: RecordFilter,
}

async fn me_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LicenseView>, ApiError> {
    let creds = Credentials::from_headers(&headers)?;
    let view = state
        .engine
        .authorize(&creds.key, &creds.fingerprint, creds.device_name.as_deref())
        .await?;
    Ok(Json(view))
}

async fn subscribe_handler(
    State(state): State<AppState>,
    _admin: AdminAccess,
    form: Result<Form<SubscribeForm>, FormRejection>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let Form(form) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let record = state.engine.issue(&form.key, form.duration_days).await?;
    Ok(Json(SubscribeResponse {
        message: format!("issued key {} for {} days", record.key, record.duration_days),
        record,
    }))
}

async fn list_handler(
    State(state): State<AppState>,
    _admin: AdminAccess,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<RecordEntry>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.engine.list(query.status).await?))
}

async fn inspect_handler(
    State(state): State<AppState>,
    _admin: AdminAccess,
    Path(key): Path<String>,
) -> Result<Json<RecordEntry>, ApiError> {
    Ok(Json(state.engine.inspect(&key).await?))
}

async fn process_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    check_content_length(&headers, state.max_upload_bytes)?;
    let creds = Credentials::from_headers(&headers)?;
    state.engine.authorize(&creds.key, &creds.fingerprint, None).await?;

    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let (file_name, input) = read_upload(&mut multipart).await?;
    let output = state.transform.run(&input, file_name.as_deref()).await?;
    debug!("Processed {} bytes into {} bytes", input.len(), output.len());

    let download = format!("processed_{}", download_name(file_name.as_deref()));
    Ok((
        [
            (CONTENT_TYPE, "application/octet-stream".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{download}\"")),
        ],
        output,
    )
        .into_response())
}

/// Rejects a declared body larger than `limit` before any of it is read.
fn check_content_length(headers: &HeaderMap, limit: u64) -> Result<(), ApiError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    match declared {
        Some(len) if len > limit => Err(ApiError::PayloadTooLarge {
            limit_mb: limit / (1024 * 1024),
        }),
        _ => Ok(()),
    }
}

/// Returns the `file` field's name and contents.
async fn read_upload(multipart: &mut Multipart) -> Result<(Option<String>, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field.bytes().await?;
            return Ok((file_name, bytes.to_vec()));
        }
    }
    Err(ApiError::BadRequest("multipart field `file` is required".to_string()))
}

/// Last path component of an uploaded name, restricted to header-safe characters.
fn download_name(file_name: Option<&str>) -> String {
    let base = file_name
        .and_then(|n| n.rsplit(['/', '\\']).next())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| (c.is_ascii_graphic() || *c == ' ') && !matches!(c, '"' | ';'))
        .collect();
    if cleaned.trim().is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Resolves once `signal` fires.
///
/// A signal listener that fails to install never resolves, so the server
/// keeps running instead of shutting down at startup.
pub async fn wait_for_shutdown<F>(signal: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => info!("Shutdown requested"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal, running until killed: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Build the HTTP API router.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = usize::try_from(state.max_upload_bytes).unwrap_or(usize::MAX);
    Router::new()
        .route("/api/v1/me", get(me_handler))
        .route("/api/v1/subscribe", post(subscribe_handler))
        .route(
            "/api/v1/process",
            post(process_handler).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/v1/records", get(list_handler))
        .route("/api/v1/records/{key}", get(inspect_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    #[test]
    fn download_name_strips_paths_and_quotes() {
        assert_eq!(download_name(Some("clip.mp4")), "clip.mp4");
        assert_eq!(download_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(download_name(Some("C:\\videos\\a\"b.mov")), "ab.mov");
        assert_eq!(download_name(Some("")), "upload");
        assert_eq!(download_name(None), "upload");
    }

    #[test]
    fn content_length_over_limit_is_rejected() {
        let mut headers = HeaderMap::new();
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("10"));
        assert!(check_content_length(&headers, 10).is_ok());

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("11"));
        assert!(matches!(
            check_content_length(&headers, 10),
            Err(ApiError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn shutdown_waits_for_signal() {
        let fired = async { Ok::<(), std::io::Error>(()) };
        tokio::time::timeout(Duration::from_secs(1), wait_for_shutdown(fired))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_signal_listener_never_shuts_down() {
        let broken = async { Err::<(), _>(std::io::Error::other("no signal driver")) };
        let outcome =
            tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(broken)).await;
        assert!(outcome.is_err());
    }

    #[test]
    fn credentials_require_key_and_device() {
        let mut headers = HeaderMap::new();
        headers.insert(KEY_HEADER, HeaderValue::from_static("K1"));
        assert!(matches!(
            Credentials::from_headers(&headers),
            Err(ApiError::MissingCredentials)
        ));

        headers.insert(DEVICE_HEADER, HeaderValue::from_static("laptop-serial"));
        let creds = Credentials::from_headers(&headers).unwrap();
        assert_eq!(creds.key, "K1");
        assert_eq!(creds.fingerprint, DeviceFingerprint::from_device_info("laptop-serial"));
        assert_eq!(creds.device_name, None);
    }
}
