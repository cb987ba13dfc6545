//! Shared test helpers for license tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use keybind_license::{
    LicenseRecord, MemoryStore, Precondition, RecordStore, Revision, Snapshot, StoreError,
    StoreResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// A fixed reference instant.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
}

/// Opens a memory store holding `records`.
pub async fn open_store(records: Vec<LicenseRecord>) -> MemoryStore {
    let store = MemoryStore::with_records(records);
    store.open().await.unwrap();
    store
}

/// Reads through to a memory store but refuses every write.
pub struct FailingWriteStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl RecordStore for FailingWriteStore {
    fn backend_name(&self) -> &'static str {
        "failing-write"
    }

    async fn open(&self) -> StoreResult<()> {
        self.inner.open().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }

    async fn get_all(&self) -> Snapshot {
        self.inner.get_all().await
    }

    async fn replace_all(&self, _: &[LicenseRecord], _: Precondition) -> StoreResult<Revision> {
        Err(StoreError::Http {
            status: 503,
            body: "service unavailable".to_string(),
        })
    }
}

/// A store that can never be read.
pub struct UnreachableStore;

#[async_trait]
impl RecordStore for UnreachableStore {
    fn backend_name(&self) -> &'static str {
        "unreachable"
    }

    async fn open(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_all(&self) -> Snapshot {
        Snapshot::Unavailable {
            reason: "connection refused".to_string(),
        }
    }

    async fn replace_all(&self, _: &[LicenseRecord], _: Precondition) -> StoreResult<Revision> {
        Err(StoreError::Network("connection refused".to_string()))
    }
}

/// Simulates another process writing between our read and our write.
///
/// The first `replace_all` applies `interloper` unconditionally before
/// forwarding, so the caller's precondition fails once.
pub struct RacingStore {
    pub inner: MemoryStore,
    interloper: Mutex<Option<Vec<LicenseRecord>>>,
}

impl RacingStore {
    pub fn new(inner: MemoryStore, interloper: Vec<LicenseRecord>) -> Self {
        Self {
            inner,
            interloper: Mutex::new(Some(interloper)),
        }
    }
}

#[async_trait]
impl RecordStore for RacingStore {
    fn backend_name(&self) -> &'static str {
        "racing"
    }

    async fn open(&self) -> StoreResult<()> {
        self.inner.open().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }

    async fn get_all(&self) -> Snapshot {
        self.inner.get_all().await
    }

    async fn replace_all(
        &self,
        records: &[LicenseRecord],
        precondition: Precondition,
    ) -> StoreResult<Revision> {
        if let Some(other) = self.interloper.lock().await.take() {
            self.inner.replace_all(&other, Precondition::Any).await?;
        }
        self.inner.replace_all(records, precondition).await
    }
}

/// Every write loses the race. Counts reads.
pub struct ContendedStore {
    pub inner: MemoryStore,
    pub reads: AtomicUsize,
}

impl ContendedStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for ContendedStore {
    fn backend_name(&self) -> &'static str {
        "contended"
    }

    async fn open(&self) -> StoreResult<()> {
        self.inner.open().await
    }

    async fn close(&self) -> StoreResult<()> {
        self.inner.close().await
    }

    async fn get_all(&self) -> Snapshot {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_all().await
    }

    async fn replace_all(&self, _: &[LicenseRecord], _: Precondition) -> StoreResult<Revision> {
        Err(StoreError::Conflict("someone else wrote first".to_string()))
    }
}
