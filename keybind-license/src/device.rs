//! Device fingerprints for license binding.
//!
//! A fingerprint is the SHA-256 of whatever device-identifying string the
//! client sends. It is unverified: the client chooses it, the server only
//! compares it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Opaque hash identifying the device a key is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceFingerprint(String);

impl DeviceFingerprint {
    /// Hashes client-supplied device info into a fingerprint.
    ///
    /// Produces lowercase hex so values match hashes already stored in
    /// existing collections.
    #[must_use]
    pub fn from_device_info(info: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(info.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Wraps an already-computed hash. Empty input means "unbound".
    #[must_use]
    pub fn from_hash(hash: impl Into<String>) -> Option<Self> {
        let hash = hash.into();
        if hash.is_empty() { None } else { Some(Self(hash)) }
    }

    /// Returns the hash string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
