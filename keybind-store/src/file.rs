//! Flat-file storage implementation.
//!
//! The collection is one pretty-printed JSON array. Revisions are the
//! SHA-256 of the file bytes, and writes go through a uniquely named
//! temporary file in the same directory that is renamed over the original.

use async_trait::async_trait;
use keybind_license::{
    normalize_bytes, LicenseRecord, Precondition, RecordStore, Revision, Snapshot, StoreError,
    StoreResult,
};
use std::ffi::OsString;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tokio::task;
use tracing::{debug, info, warn};

/// Stores the collection in a local JSON file.
pub struct FileStore {
    path: PathBuf,
    open: RwLock<bool>,
    /// Holds the precondition check and the rename together.
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store backed by `path`. Nothing touches disk until `open`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            open: RwLock::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the collection file path.
    pub fn path(&self) -> &Path {
        &self.path
    }


    /// Reads the raw file. `None` if it does not exist.
    async fn read_raw(&self) -> StoreResult<Option<Vec<u8>>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RecordStore for FileStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn open(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await?;
                info!("Created record store directory: {:?}", parent);
            }
        }
        *self.open.write().await = true;
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        *self.open.write().await = false;
        Ok(())
    }

    async fn get_all(&self) -> Snapshot {
        if !*self.open.read().await {
            return Snapshot::Unavailable {
                reason: "file store is closed".to_string(),
            };
        }

        let bytes = match self.read_raw().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Snapshot::empty(),
            Err(e) => {
                warn!("Failed to read {:?}: {}", self.path, e);
                return Snapshot::Unavailable { reason: e.to_string() };
            }
        };

        match normalize_bytes(&bytes) {
            Ok(records) => Snapshot::Loaded {
                records,
                revision: Some(Revision::digest(&bytes)),
            },
            Err(e) => {
                warn!("Unusable record collection in {:?}: {}", self.path, e);
                Snapshot::Unavailable { reason: e.to_string() }
            }
        }
    }

    async fn replace_all(
        &self,
        records: &[LicenseRecord],
        precondition: Precondition,
    ) -> StoreResult<Revision> {
        let _guard = self.write_lock.lock().await;
        if !*self.open.read().await {
            return Err(StoreError::Closed);
        }

        let current = self.read_raw().await?.map(|bytes| Revision::digest(&bytes));
        precondition.check(current.as_ref())?;

        let bytes = serde_json::to_vec_pretty(records)?;
        let revision = Revision::digest(&bytes);
        let path = self.path.clone();
        task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))??;

        debug!("Wrote {} records to {:?} (revision {})", records.len(), self.path, revision);
        Ok(revision)
    }
}

/// Writes `bytes` to a uniquely named sibling of `path`, then renames it over
/// `path`. Concurrent writers never share a temporary file.
fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut prefix = OsString::from(".");
    prefix.push(path.file_name().unwrap_or_default());
    prefix.push(".");

    let mut temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
