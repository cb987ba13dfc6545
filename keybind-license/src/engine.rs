//! Key/device binding state machine.
//!
//! Authorization checks run in a fixed order, and the order decides which
//! rejection a caller sees:
//!
//! 1. unknown key
//! 2. expired (only an activated key can expire)
//! 3. bound to a different device
//!
//! A successful authorization binds an unbound key to the presenting device,
//! starts its clock if it has not started, and stamps `last_used`, all in a
//! single write.

use crate::device::DeviceFingerprint;
use crate::error::{LicenseError, LicenseResult};
use crate::expiry;
use crate::record::{LicenseRecord, LicenseStatus, LicenseView};
use crate::store::{Precondition, RecordStore, Snapshot};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// How many times a mutation is re-evaluated after losing a write race.
pub const MAX_CONFLICT_ATTEMPTS: usize = 3;

/// Selects records for inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFilter {
    #[default]
    All,
    NotActivated,
    Active,
    Expired,
    Bound,
    Unbound,
}

impl RecordFilter {
    /// Returns true if `record` passes this filter at `now`.
    #[must_use]
    pub fn matches(&self, record: &LicenseRecord, now: DateTime<Utc>) -> bool {
        match self {
            Self::All => true,
            Self::NotActivated => record.status(now) == LicenseStatus::NotActivated,
            Self::Active => record.status(now) == LicenseStatus::Active,
            Self::Expired => record.status(now) == LicenseStatus::Expired,
            Self::Bound => record.is_bound(),
            Self::Unbound => !record.is_bound(),
        }
    }
}

/// A record as shown to operators, with its derived status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordEntry {
    #[serde(flatten)]
    pub record: LicenseRecord,
    pub status: LicenseStatus,
    pub expires_on: Option<DateTime<Utc>>,
}

impl RecordEntry {
    fn new(record: LicenseRecord, now: DateTime<Utc>) -> Self {
        Self {
            status: record.status(now),
            expires_on: record.expires_at(),
            record,
        }
    }
}

/// Decides whether `fingerprint` may use `key`, without side effects.
///
/// Returns the index of the record to update on success.
pub fn evaluate(
    records: &[LicenseRecord],
    key: &str,
    fingerprint: &DeviceFingerprint,
    now: DateTime<Utc>,
) -> LicenseResult<usize> {
    let idx = records
        .iter()
        .position(|r| r.key == key)
        .ok_or_else(|| LicenseError::KeyNotFound(key.to_string()))?;
    let record = &records[idx];

    let expires_at = record.expires_at();
    if expiry::is_expired(now, expires_at) {
        let expired_on = expires_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();
        return Err(LicenseError::Expired { expired_on });
    }

    if record.device_hash.as_ref().is_some_and(|bound| bound != fingerprint) {
        return Err(LicenseError::DeviceMismatch);
    }

    Ok(idx)
}

/// Applies the effects of a successful authorization. Returns true if this
/// call bound the key.
fn apply_authorization(
    record: &mut LicenseRecord,
    fingerprint: &DeviceFingerprint,
    label: Option<&str>,
    now: DateTime<Utc>,
) -> bool {
    let binding = record.device_hash.is_none();
    if binding {
        record.device_hash = Some(fingerprint.clone());
        record.device_name = label.map(str::to_string);
    }
    // A bound record is always activated, including legacy rows bound
    // before their clock was stamped.
    if record.activated_at.is_none() {
        record.activated_at = Some(now);
    }
    record.last_used_at = Some(now);
    binding
}

/// Runs license operations against an injected record store.
pub struct BindingEngine {
    store: Arc<dyn RecordStore>,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl BindingEngine {
    /// Creates an engine over `store`. The caller owns the store lifecycle.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Authorizes `fingerprint` to use `key` now.
    pub async fn authorize(
        &self,
        key: &str,
        fingerprint: &DeviceFingerprint,
        label: Option<&str>,
    ) -> LicenseResult<LicenseView> {
        self.authorize_at(key, fingerprint, label, Utc::now()).await
    }

    /// Authorizes `fingerprint` to use `key` at `now`.
    ///
    /// An unreadable store is treated as an empty one, so the caller sees
    /// [`LicenseError::KeyNotFound`]. A failed write always surfaces.
    pub async fn authorize_at(
        &self,
        key: &str,
        fingerprint: &DeviceFingerprint,
        label: Option<&str>,
        now: DateTime<Utc>,
    ) -> LicenseResult<LicenseView> {
        let _guard = self.write_lock.lock().await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut records, revision) = match self.store.get_all().await {
                Snapshot::Loaded { records, revision } => (records, revision),
                Snapshot::Unavailable { reason } => {
                    warn!(
                        "{} store unavailable, treating as empty: {}",
                        self.store.backend_name(),
                        reason
                    );
                    return Err(LicenseError::KeyNotFound(key.to_string()));
                }
            };

            let idx = evaluate(&records, key, fingerprint, now)?;
            let binding = apply_authorization(&mut records[idx], fingerprint, label, now);

            match self
                .store
                .replace_all(&records, Precondition::observed(revision.as_ref()))
                .await
            {
                Ok(rev) => {
                    if binding {
                        info!("Bound key {} to device {}", records[idx].masked_key(), fingerprint);
                    }
                    debug!("authorization committed at revision {}", rev);
                    return Ok(records[idx].view(now));
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_ATTEMPTS => {
                    warn!("authorization lost a write race (attempt {}): {}", attempt, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Issues a new, unactivated key.
    pub async fn issue(&self, key: &str, duration_days: u32) -> LicenseResult<LicenseRecord> {
        let key = key.trim();
        if key.is_empty() {
            return Err(LicenseError::InvalidRecord("key must not be empty".to_string()));
        }
        if duration_days == 0 {
            return Err(LicenseError::InvalidRecord(
                "duration must be at least one day".to_string(),
            ));
        }

        let _guard = self.write_lock.lock().await;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (mut records, revision) = match self.store.get_all().await {
                Snapshot::Loaded { records, revision } => (records, revision),
                Snapshot::Unavailable { reason } => return Err(LicenseError::StoreUnavailable(reason)),
            };

            if records.iter().any(|r| r.key == key) {
                return Err(LicenseError::DuplicateKey(key.to_string()));
            }

            let record = LicenseRecord::issue(key, duration_days);
            records.push(record.clone());

            match self
                .store
                .replace_all(&records, Precondition::observed(revision.as_ref()))
                .await
            {
                Ok(_) => {
                    info!("Issued key {} for {} days", record.masked_key(), duration_days);
                    return Ok(record);
                }
                Err(e) if e.is_conflict() && attempt < MAX_CONFLICT_ATTEMPTS => {
                    warn!("issue lost a write race (attempt {}): {}", attempt, e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Lists records passing `filter` now.
    pub async fn list(&self, filter: RecordFilter) -> LicenseResult<Vec<RecordEntry>> {
        self.list_at(filter, Utc::now()).await
    }

    /// Lists records passing `filter` at `now`.
    pub async fn list_at(
        &self,
        filter: RecordFilter,
        now: DateTime<Utc>,
    ) -> LicenseResult<Vec<RecordEntry>> {
        let records = self.load_for_inspection().await?;
        Ok(records
            .into_iter()
            .filter(|r| filter.matches(r, now))
            .map(|r| RecordEntry::new(r, now))
            .collect())
    }

    /// Looks up one record.
    pub async fn inspect(&self, key: &str) -> LicenseResult<RecordEntry> {
        self.inspect_at(key, Utc::now()).await
    }

    /// Looks up one record, deriving its status at `now`.
    pub async fn inspect_at(&self, key: &str, now: DateTime<Utc>) -> LicenseResult<RecordEntry> {
        self.load_for_inspection()
            .await?
            .into_iter()
            .find(|r| r.key == key)
            .map(|r| RecordEntry::new(r, now))
            .ok_or_else(|| LicenseError::KeyNotFound(key.to_string()))
    }

    async fn load_for_inspection(&self) -> LicenseResult<Vec<LicenseRecord>> {
        match self.store.get_all().await {
            Snapshot::Loaded { records, .. } => Ok(records),
            Snapshot::Unavailable { reason } => Err(LicenseError::StoreUnavailable(reason)),
        }
    }
}
