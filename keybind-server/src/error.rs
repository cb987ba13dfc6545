//! HTTP error mapping.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use keybind_license::LicenseError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::transform::TransformError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("X-KEY and X-DEVICE headers are required")]
    MissingCredentials,

    #[error("admin key missing or invalid")]
    AdminRequired,

    #[error("upload too large; the limit is {limit_mb} MiB")]
    PayloadTooLarge { limit_mb: u64 },

    #[error("{0}")]
    BadRequest(String),

    #[error("upload could not be read: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    License(#[from] LicenseError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials => StatusCode::UNAUTHORIZED,
            Self::AdminRequired => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Multipart(e) => e.status(),
            Self::License(e) => match e {
                LicenseError::KeyNotFound(_) => StatusCode::NOT_FOUND,
                LicenseError::Expired { .. } | LicenseError::DeviceMismatch => StatusCode::FORBIDDEN,
                LicenseError::DuplicateKey(_) | LicenseError::InvalidRecord(_) => {
                    StatusCode::BAD_REQUEST
                }
                LicenseError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                LicenseError::Store(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Transform(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed with {}: {}", status, self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
