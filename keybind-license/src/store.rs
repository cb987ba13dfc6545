//! Record store abstraction.
//!
//! Backends only know how to read and replace the whole collection. There
//! is no per-record primitive; every mutation is read, change in memory,
//! write back. Writes carry the revision observed on read so a backend can
//! refuse a write that would clobber someone else's change.

use crate::error::{StoreError, StoreResult};
use crate::record::LicenseRecord;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

/// Opaque version token of a stored collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(String);

impl Revision {
    /// Wraps a backend-specific token (an ETag, a counter, ...).
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Content-addressed revision: hex SHA-256 of the stored bytes.
    #[must_use]
    pub fn digest(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Condition a write must satisfy to be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional replace.
    Any,
    /// The collection must not exist yet.
    Absent,
    /// The collection must still be at this revision.
    Matches(Revision),
}

impl Precondition {
    /// The precondition that pins a write to what was read.
    #[must_use]
    pub fn observed(revision: Option<&Revision>) -> Self {
        match revision {
            Some(rev) => Self::Matches(rev.clone()),
            None => Self::Absent,
        }
    }

    /// Checks this precondition against the store's current revision.
    pub fn check(&self, current: Option<&Revision>) -> StoreResult<()> {
        match (self, current) {
            (Self::Any, _) | (Self::Absent, None) => Ok(()),
            (Self::Matches(expected), Some(actual)) if expected == actual => Ok(()),
            (Self::Absent, Some(actual)) => Err(StoreError::Conflict(format!(
                "collection already exists at revision {actual}"
            ))),
            (Self::Matches(expected), Some(actual)) => Err(StoreError::Conflict(format!(
                "expected revision {expected}, found {actual}"
            ))),
            (Self::Matches(expected), None) => Err(StoreError::Conflict(format!(
                "expected revision {expected}, collection is gone"
            ))),
        }
    }
}

/// Result of reading the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// The collection was read. `revision` is `None` when it does not exist
    /// yet, which reads as no records.
    Loaded {
        records: Vec<LicenseRecord>,
        revision: Option<Revision>,
    },
    /// The store could not be read. Callers that must not fail treat this as
    /// an empty collection; anything that writes must not.
    Unavailable { reason: String },
}

impl Snapshot {
    /// A loaded, empty, not-yet-existing collection.
    #[must_use]
    pub fn empty() -> Self {
        Self::Loaded {
            records: Vec::new(),
            revision: None,
        }
    }

    /// Records of a loaded snapshot; empty when unavailable.
    #[must_use]
    pub fn records(&self) -> &[LicenseRecord] {
        match self {
            Self::Loaded { records, .. } => records,
            Self::Unavailable { .. } => &[],
        }
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Whole-collection storage for license records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Prepares the store for use.
    async fn open(&self) -> StoreResult<()>;

    /// Releases the store. Reads become `Unavailable`, writes fail.
    async fn close(&self) -> StoreResult<()>;

    /// Reads the full, normalized collection. Never errors: failures come
    /// back as [`Snapshot::Unavailable`].
    async fn get_all(&self) -> Snapshot;

    /// Replaces the full collection if `precondition` holds, returning the
    /// new revision. Failures always propagate.
    async fn replace_all(
        &self,
        records: &[LicenseRecord],
        precondition: Precondition,
    ) -> StoreResult<Revision>;
}

/// In-process store. Exact compare-and-swap on a version counter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    open: bool,
    records: Option<Vec<LicenseRecord>>,
    version: u64,
}

impl MemoryState {
    fn revision(&self) -> Option<Revision> {
        self.records.as_ref().map(|_| Revision::new(self.version.to_string()))
    }
}

impl MemoryStore {
    /// Creates a store with no collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose collection already holds `records`.
    #[must_use]
    pub fn with_records(records: Vec<LicenseRecord>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                open: false,
                records: Some(records),
                version: 1,
            }),
        }
    }

    /// Returns a copy of the stored records regardless of lifecycle state.
    pub async fn records(&self) -> Vec<LicenseRecord> {
        self.state.lock().await.records.clone().unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn open(&self) -> StoreResult<()> {
        self.state.lock().await.open = true;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        self.state.lock().await.open = false;
        Ok(())
    }

    async fn get_all(&self) -> Snapshot {
        let state = self.state.lock().await;
        if !state.open {
            return Snapshot::Unavailable {
                reason: "memory store is closed".to_string(),
            };
        }
        Snapshot::Loaded {
            records: state.records.clone().unwrap_or_default(),
            revision: state.revision(),
        }
    }

    async fn replace_all(
        &self,
        records: &[LicenseRecord],
        precondition: Precondition,
    ) -> StoreResult<Revision> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(StoreError::Closed);
        }
        precondition.check(state.revision().as_ref())?;
        state.version += 1;
        state.records = Some(records.to_vec());
        debug!("memory store now at version {}", state.version);
        Ok(Revision::new(state.version.to_string()))
    }
}
