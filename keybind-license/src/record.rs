//! The license record and the views derived from it.
//!
//! Stored field names (`activated_on`, `device_hash`, `last_used`, ...) are
//! kept as they appear in existing collections; the Rust names describe what
//! the fields hold.

use crate::device::DeviceFingerprint;
use crate::expiry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validity applied to records issued without an explicit duration.
pub const DEFAULT_DURATION_DAYS: u32 = 30;

/// One issued license key and its binding state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// The key, unique within the collection.
    pub key: String,
    /// Days of validity counted from activation.
    #[serde(default = "default_duration_days")]
    pub duration_days: u32,
    /// When the key was first successfully used.
    #[serde(rename = "activated_on", default, with = "instant")]
    pub activated_at: Option<DateTime<Utc>>,
    /// Fingerprint of the bound device.
    #[serde(default, with = "fingerprint")]
    pub device_hash: Option<DeviceFingerprint>,
    /// Human-readable label of the bound device.
    #[serde(default)]
    pub device_name: Option<String>,
    /// Most recent successful authorization.
    #[serde(rename = "last_used", default, with = "instant")]
    pub last_used_at: Option<DateTime<Utc>>,
}

fn default_duration_days() -> u32 {
    DEFAULT_DURATION_DAYS
}

impl LicenseRecord {
    /// Creates a freshly issued, unactivated and unbound record.
    #[must_use]
    pub fn issue(key: impl Into<String>, duration_days: u32) -> Self {
        Self {
            key: key.into(),
            duration_days,
            activated_at: None,
            device_hash: None,
            device_name: None,
            last_used_at: None,
        }
    }

    /// Returns the expiry instant, or `None` if never activated.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        expiry::expiry(self.activated_at, self.duration_days)
    }

    /// Returns true if the record is bound to a device.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.device_hash.is_some()
    }

    /// Returns the status of this record at `now`.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> LicenseStatus {
        match self.expires_at() {
            None => LicenseStatus::NotActivated,
            Some(exp) if expiry::is_expired(now, Some(exp)) => LicenseStatus::Expired,
            Some(_) => LicenseStatus::Active,
        }
    }

    /// The key with everything past its first four characters hidden.
    #[must_use]
    pub fn masked_key(&self) -> String {
        mask_key(&self.key)
    }

    /// Builds the client-facing view of this record at `now`.
    #[must_use]
    pub fn view(&self, now: DateTime<Utc>) -> LicenseView {
        let expires_on = self.expires_at();
        LicenseView {
            key_masked: self.masked_key(),
            device_name: self.device_name.clone(),
            activated_on: self.activated_at,
            expires_on,
            days_left: expiry::days_left(now, expires_on, self.duration_days),
            is_active: !expiry::is_expired(now, expires_on),
            last_used: self.last_used_at,
        }
    }
}

/// The activation/expiry state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// Issued but never used; the clock has not started.
    NotActivated,
    /// Activated and within its validity window.
    Active,
    /// Past its validity window. Permanent.
    Expired,
}

/// What an authorized caller gets to see about its license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseView {
    pub key_masked: String,
    pub device_name: Option<String>,
    pub activated_on: Option<DateTime<Utc>>,
    pub expires_on: Option<DateTime<Utc>>,
    pub days_left: i64,
    pub is_active: bool,
    pub last_used: Option<DateTime<Utc>>,
}

/// Keeps the first four characters of a key.
fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}****")
}

/// Serde adapter for optional UTC instants.
///
/// Writes RFC 3339. Reads RFC 3339 or offset-less ISO 8601, the latter taken
/// as UTC. Null, missing and empty strings all read as `None`.
pub(crate) mod instant {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => parse(s).map(Some).map_err(serde::de::Error::custom),
        }
    }

    pub fn parse(s: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(at) = DateTime::parse_from_rfc3339(s) {
            return Ok(at.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| format!("invalid timestamp {s:?}: {e}"))
    }
}

/// Serde adapter for the bound fingerprint; `""` is the unbound sentinel.
pub(crate) mod fingerprint {
    use crate::device::DeviceFingerprint;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DeviceFingerprint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.as_ref().map_or("", DeviceFingerprint::as_str))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DeviceFingerprint>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(DeviceFingerprint::from_hash))
    }
}
