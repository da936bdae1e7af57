use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

/// A content-addressed store for JSON documents.
///
/// `publish` returns an opaque content id derived from the document's
///  bytes; `fetch` returns the document stored under that id.
#[async_trait]
pub trait ContentStore: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync;

    async fn publish(&self, value: &Value) -> Result<String, Self::Error>;

    async fn fetch(&self, content_id: &str) -> Result<Value, Self::Error>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryContentStoreError {
    #[error("content not found: {0}")]
    NotFound(String),
    #[error("content store is offline")]
    Offline,
    #[error("content is not json: {0}")]
    Json(String),
}

#[derive(Debug, Default)]
struct MemoryContentStoreInner {
    /// content id (BLAKE3 hex of the bytes) -> bytes
    blobs: HashMap<String, Vec<u8>>,
    publishes: usize,
    fetches: usize,
    offline: bool,
}

/// In-memory content store.
///
/// Content ids are the BLAKE3 hex digest of the serialized document,
///  matching the ids produced by [`super::BlobsStore`]. Also counts
///  calls and can be switched offline to exercise failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    inner: Arc<Mutex<MemoryContentStoreInner>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw bytes as-is, bypassing json encoding
    pub fn insert_raw(&self, bytes: Vec<u8>) -> String {
        let content_id = blake3::hash(&bytes).to_hex().to_string();
        self.inner.lock().blobs.insert(content_id.clone(), bytes);
        content_id
    }

    /// When offline every publish and fetch fails
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().offline = offline;
    }

    /// Number of successful publishes
    pub fn publish_count(&self) -> usize {
        self.inner.lock().publishes
    }

    /// Number of fetch attempts, including failed ones
    pub fn fetch_count(&self) -> usize {
        self.inner.lock().fetches
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    type Error = MemoryContentStoreError;

    async fn publish(&self, value: &Value) -> Result<String, Self::Error> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| MemoryContentStoreError::Json(e.to_string()))?;
        if self.inner.lock().offline {
            return Err(MemoryContentStoreError::Offline);
        }
        let content_id = self.insert_raw(bytes);
        self.inner.lock().publishes += 1;
        Ok(content_id)
    }

    async fn fetch(&self, content_id: &str) -> Result<Value, Self::Error> {
        let bytes = {
            let mut inner = self.inner.lock();
            inner.fetches += 1;
            if inner.offline {
                return Err(MemoryContentStoreError::Offline);
            }
            inner
                .blobs
                .get(content_id)
                .cloned()
                .ok_or_else(|| MemoryContentStoreError::NotFound(content_id.to_string()))?
        };
        serde_json::from_slice(&bytes).map_err(|e| MemoryContentStoreError::Json(e.to_string()))
    }
}
