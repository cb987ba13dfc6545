//! Licensing and device binding for keybind.
//!
//! This crate handles:
//! - License records and their stored shape
//! - Load-time normalization of older records
//! - Expiry arithmetic (activation instant + duration, UTC)
//! - The binding state machine that admits, binds, or rejects a device
//! - The whole-collection record store abstraction
//!
//! # Design Principles
//!
//! - **Activation on first use**: a key's clock starts the first time it is
//!   authorized, not when it is issued
//! - **One device per key**: the first device to use a key owns it for life
//! - **Single write per call**: binding, activation and `last_used` land in
//!   one read-modify-write cycle
//! - **Versioned writes**: each write is conditional on the revision it read,
//!   so concurrent processes cannot silently overwrite each other
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use keybind_license::{BindingEngine, DeviceFingerprint, MemoryStore, RecordStore};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemoryStore::new());
//! store.open().await.unwrap();
//!
//! let engine = BindingEngine::new(store);
//! engine.issue("K1-DEMO", 30).await.unwrap();
//!
//! let laptop = DeviceFingerprint::from_device_info("laptop-serial-123");
//! let view = engine.authorize("K1-DEMO", &laptop, Some("Laptop")).await.unwrap();
//! assert!(view.is_active);
//! assert_eq!(view.days_left, 30);
//! # });
//! ```

mod device;
mod engine;
mod error;
pub mod expiry;
mod normalize;
mod record;
mod store;

pub use device::DeviceFingerprint;
pub use engine::{evaluate, BindingEngine, RecordEntry, RecordFilter, MAX_CONFLICT_ATTEMPTS};
pub use error::{LicenseError, LicenseResult, Rejection, StoreError, StoreResult};
pub use normalize::{normalize_bytes, normalize_collection, to_collection};
pub use record::{LicenseRecord, LicenseStatus, LicenseView, DEFAULT_DURATION_DAYS};
pub use store::{MemoryStore, Precondition, RecordStore, Revision, Snapshot};
