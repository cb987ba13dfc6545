//! Command line and environment configuration.

use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, ValueEnum};
use keybind_license::{MemoryStore, RecordStore};
use keybind_store::{FileStore, RemoteStore, RemoteStoreConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

const MIB: u64 = 1024 * 1024;

/// Which record store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Hosted JSON document (JSONBin v3 API).
    Remote,
    /// Local JSON file.
    File,
    /// In-process only; lost on exit.
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "keybind-server")]
#[command(about = "License key and device binding service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "KEYBIND_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Secret expected in the X-Admin-Key header
    #[arg(long, env = "KEYBIND_ADMIN_KEY", hide_env_values = true, value_parser = NonEmptyStringValueParser::new())]
    pub admin_key: String,

    /// Record store backend
    #[arg(long, env = "KEYBIND_STORE", value_enum, default_value_t = StoreKind::Remote)]
    pub store: StoreKind,

    /// Remote store API base URL
    #[arg(long, env = "KEYBIND_STORE_URL", default_value = "https://api.jsonbin.io/v3")]
    pub store_url: String,

    /// Remote document id
    #[arg(long, env = "JSONBIN_ID", default_value = "")]
    pub bin_id: String,

    /// Remote access key
    #[arg(long, env = "JSONBIN_KEY", default_value = "", hide_env_values = true)]
    pub master_key: String,

    /// The remote store honours If-Match on writes
    #[arg(long = "if-match", env = "KEYBIND_STORE_IF_MATCH")]
    pub if_match: bool,

    /// Collection file for the file backend
    #[arg(long, env = "KEYBIND_STORE_PATH", default_value = "licenses.json")]
    pub store_path: PathBuf,

    /// Remote store request timeout
    #[arg(long, env = "KEYBIND_STORE_TIMEOUT_SECS", default_value_t = 10)]
    pub store_timeout_secs: u64,

    /// ffmpeg executable
    #[arg(long, env = "KEYBIND_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Largest accepted upload, in MiB
    #[arg(long, env = "KEYBIND_MAX_UPLOAD_MB", default_value_t = 200)]
    pub max_upload_mb: u64,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn remote_config(&self) -> RemoteStoreConfig {
        RemoteStoreConfig {
            api_base_url: self.store_url.clone(),
            bin_id: self.bin_id.clone(),
            master_key: self.master_key.clone(),
            timeout_secs: self.store_timeout_secs,
            supports_if_match: self.if_match,
        }
    }

    /// Builds the configured backend. It still has to be opened.
    pub fn build_store(&self) -> Arc<dyn RecordStore> {
        match self.store {
            StoreKind::Remote => Arc::new(RemoteStore::new(self.remote_config())),
            StoreKind::File => Arc::new(FileStore::new(&self.store_path)),
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        }
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(MIB)
    }
}
