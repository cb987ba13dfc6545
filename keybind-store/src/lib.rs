//! Durable record store backends for keybind.
//!
//! Both backends implement [`keybind_license::RecordStore`]:
//! - [`FileStore`]: one JSON file on local disk
//! - [`RemoteStore`]: one JSON document on a hosted store (JSONBin v3 API)
//!
//! Reads never fail outward; an unreachable or undecodable collection comes
//! back as `Snapshot::Unavailable`. Writes always report failure.

pub mod file;
pub mod remote;

pub use file::FileStore;
pub use remote::{RemoteStore, RemoteStoreConfig, MASTER_KEY_HEADER};
