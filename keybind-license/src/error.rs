//! Error types for the licensing module.

use thiserror::Error;

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Why an authorization attempt was refused.
///
/// Rejections never change the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The key is not in the collection.
    KeyNotFound,
    /// The key was activated and its validity window has closed.
    Expired,
    /// The key is bound to a different device.
    DeviceMismatch,
}

/// Licensing-specific errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Unknown license key.
    #[error("license key not found: {0}")]
    KeyNotFound(String),

    /// License has expired.
    #[error("license expired on {expired_on}")]
    Expired {
        /// RFC 3339 expiry instant.
        expired_on: String,
    },

    /// The key is bound to another device.
    #[error("license key is bound to another device")]
    DeviceMismatch,

    /// A key with the same value already exists.
    #[error("license key already exists: {0}")]
    DuplicateKey(String),

    /// Admin input that cannot form a valid record.
    #[error("invalid license record: {0}")]
    InvalidRecord(String),

    /// The record collection could not be read.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store write failed.
    #[error("record store error: {0}")]
    Store(#[from] StoreError),
}

impl LicenseError {
    /// Returns the authorization rejection this error represents, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Self::KeyNotFound(_) => Some(Rejection::KeyNotFound),
            Self::Expired { .. } => Some(Rejection::Expired),
            Self::DeviceMismatch => Some(Rejection::DeviceMismatch),
            _ => None,
        }
    }
}

/// Errors raised by record store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The remote answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The collection changed since it was read.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// The store has not been opened, or was closed.
    #[error("record store is closed")]
    Closed,

    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored collection has an unusable shape.
    #[error("corrupt record collection: {0}")]
    Corrupt(String),

    /// Invalid backend configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Returns true if this error is a failed write precondition.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
