//! Remote JSON document storage implementation.
//!
//! Speaks the JSONBin v3 shape: `GET {base}/b/{id}` returns
//! `{"record": [...], "metadata": {...}}` and `PUT {base}/b/{id}` replaces
//! the document. A bare array body is accepted as well.
//!
//! Conditional writes use `If-Match` when the server honours it. Otherwise
//! the revision is a digest of the record JSON and the precondition is
//! verified by re-reading right before the write, which narrows the race
//! window but cannot close it.

use async_trait::async_trait;
use keybind_license::{
    normalize_collection, to_collection, LicenseRecord, Precondition, RecordStore, Revision,
    Snapshot, StoreError, StoreResult,
};
use reqwest::header::{CONTENT_TYPE, ETAG, IF_MATCH, IF_NONE_MATCH};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Header carrying the JSONBin access key.
pub const MASTER_KEY_HEADER: &str = "X-Master-Key";

/// Remote store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteStoreConfig {
    /// API base URL (e.g. `https://api.jsonbin.io/v3`).
    pub api_base_url: String,
    /// Identifier of the document holding the collection.
    pub bin_id: String,
    /// Access key sent with every request.
    pub master_key: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Whether the server returns `ETag` and honours `If-Match`.
    pub supports_if_match: bool,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.jsonbin.io/v3".to_string(),
            bin_id: String::new(),
            master_key: String::new(),
            timeout_secs: 10,
            supports_if_match: false,
        }
    }
}

/// A fetched document: records plus the revision they were read at.
type Fetched = Option<(Vec<LicenseRecord>, Revision)>;

/// Stores the collection as one remote JSON document.
pub struct RemoteStore {
    config: RemoteStoreConfig,
    client: RwLock<Option<Client>>,
}

impl RemoteStore {
    /// Creates a remote store. No request is made until `open`.
    pub fn new(config: RemoteStoreConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RemoteStoreConfig {
        &self.config
    }

    fn document_url(&self) -> String {
        format!(
            "{}/b/{}",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.bin_id
        )
    }

    async fn client(&self) -> Option<Client> {
        self.client.read().await.clone()
    }

    /// Revision of a document body when the server gives no usable ETag.
    fn digest_of(record: &Value) -> StoreResult<Revision> {
        Ok(Revision::digest(&serde_json::to_vec(record)?))
    }

    /// Reads the document. `Ok(None)` if it does not exist.
    async fn fetch(&self, client: &Client) -> StoreResult<Fetched> {
        let response = client
            .get(self.document_url())
            .header(MASTER_KEY_HEADER, &self.config.master_key)
            .send()
            .await
            .map_err(|e| StoreError::Network(format!("read failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| StoreError::Corrupt(format!("undecodable response: {e}")))?;
        let record = if body.get("record").is_some() {
            body["record"].take()
        } else {
            body
        };

        let revision = match (self.config.supports_if_match, etag) {
            (true, Some(tag)) => Revision::new(tag),
            // A digest sent as If-Match would never match.
            (true, None) => {
                return Err(StoreError::Config(
                    "remote store is set to use If-Match but sent no ETag".to_string(),
                ));
            }
            (false, _) => Self::digest_of(&record)?,
        };
        let records = normalize_collection(record)?;
        Ok(Some((records, revision)))
    }
}

#[async_trait]
impl RecordStore for RemoteStore {
    fn backend_name(&self) -> &'static str {
        "remote"
    }

    async fn open(&self) -> StoreResult<()> {
        if self.config.bin_id.is_empty() {
            return Err(StoreError::Config("bin id is not set".to_string()));
        }
        if self.config.master_key.is_empty() {
            return Err(StoreError::Config("master key is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(format!("failed to create HTTP client: {e}")))?;
        *self.client.write().await = Some(client);
        debug!("Remote store open at {}", self.document_url());
        Ok(())
    }

    async fn close(&self) -> StoreResult<()> {
        *self.client.write().await = None;
        Ok(())
    }

    async fn get_all(&self) -> Snapshot {
        let Some(client) = self.client().await else {
            return Snapshot::Unavailable {
                reason: "remote store is closed".to_string(),
            };
        };

        match self.fetch(&client).await {
            Ok(Some((records, revision))) => Snapshot::Loaded {
                records,
                revision: Some(revision),
            },
            Ok(None) => Snapshot::empty(),
            Err(e) => {
                warn!("Remote store read failed: {}", e);
                Snapshot::Unavailable { reason: e.to_string() }
            }
        }
    }

    async fn replace_all(
        &self,
        records: &[LicenseRecord],
        precondition: Precondition,
    ) -> StoreResult<Revision> {
        let client = self.client().await.ok_or(StoreError::Closed)?;

        if !self.config.supports_if_match && precondition != Precondition::Any {
            let current = self.fetch(&client).await?.map(|(_, rev)| rev);
            precondition.check(current.as_ref())?;
        }

        let document = to_collection(records)?;
        let mut request = client
            .put(self.document_url())
            .header(MASTER_KEY_HEADER, &self.config.master_key)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(serde_json::to_vec_pretty(&document)?);

        if self.config.supports_if_match {
            request = match &precondition {
                Precondition::Any => request,
                Precondition::Absent => request.header(IF_NONE_MATCH, "*"),
                Precondition::Matches(rev) => request.header(IF_MATCH, rev.as_str()),
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(format!("write failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::PRECONDITION_FAILED {
            return Err(StoreError::Conflict(format!(
                "remote rejected write at {precondition:?}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let revision = match (self.config.supports_if_match, etag) {
            (true, Some(tag)) => Revision::new(tag),
            (true, None) => {
                warn!("Remote store accepted a write without returning an ETag");
                Self::digest_of(&document)?
            }
            (false, _) => Self::digest_of(&document)?,
        };
        debug!("Wrote {} records to remote store (revision {})", records.len(), revision);
        Ok(revision)
    }
}
