use std::future::IntoFuture;
use std::ops::Deref;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use iroh_blobs::{
    api::{
        blobs::{BlobStatus, Blobs},
        ExportBaoError, RequestError,
    },
    store::{fs::FsStore, mem::MemStore},
    BlobsProtocol, Hash,
};
use serde_json::Value;

use super::ContentStore;

/// Content store over a local iroh-blobs store.
///  Documents are stored as their json bytes and addressed
///  by the hex of their BLAKE3 hash.
#[derive(Clone, Debug)]
pub struct BlobsStore {
    pub inner: Arc<BlobsProtocol>,
}

impl Deref for BlobsStore {
    type Target = Arc<BlobsProtocol>;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobsStoreError {
    #[error("blobs store error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blob store i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("export bao error: {0}")]
    ExportBao(#[from] ExportBaoError),
    #[error("request error: {0}")]
    Request(#[from] RequestError),
    #[error("invalid content id: {0}")]
    InvalidContentId(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BlobsStore {
    /// Load a blob store from the given path
    pub async fn fs(path: &Path) -> Result<Self, BlobsStoreError> {
        tracing::debug!("BlobsStore::fs called with path: {:?}", path);
        let store = FsStore::load(path).await?;
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    /// Load a memory blobs store
    pub async fn memory() -> Result<Self, BlobsStoreError> {
        let store = MemStore::new();
        let blobs = BlobsProtocol::new(&store, None);
        Ok(Self {
            inner: Arc::new(blobs),
        })
    }

    /// Get a handle to the underlying blobs client against
    ///  the store
    pub fn blobs(&self) -> &Blobs {
        self.inner.store().blobs()
    }

    /// Get a blob as bytes
    pub async fn get(&self, hash: &Hash) -> Result<Bytes, BlobsStoreError> {
        let bytes = self.blobs().get_bytes(*hash).await?;
        Ok(bytes)
    }

    /// Store a vec of bytes as a blob
    pub async fn put(&self, data: Vec<u8>) -> Result<Hash, BlobsStoreError> {
        let hash = self.blobs().add_bytes(data).into_future().await?.hash;
        Ok(hash)
    }

    /// Whether the blob is completely present in the store
    pub async fn stat(&self, hash: &Hash) -> Result<bool, BlobsStoreError> {
        let stat = self
            .blobs()
            .status(*hash)
            .await
            .map_err(|err| BlobsStoreError::Default(anyhow!(err)))?;
        Ok(matches!(stat, BlobStatus::Complete { .. }))
    }

    fn parse_content_id(content_id: &str) -> Result<Hash, BlobsStoreError> {
        Hash::from_str(content_id)
            .map_err(|e| BlobsStoreError::InvalidContentId(format!("{}: {}", content_id, e)))
    }
}

#[async_trait]
impl ContentStore for BlobsStore {
    type Error = BlobsStoreError;

    async fn publish(&self, value: &Value) -> Result<String, Self::Error> {
        let bytes = serde_json::to_vec(value)?;
        let hash = self.put(bytes).await?;
        tracing::debug!("published document {}", hash);
        Ok(hash.to_hex().to_string())
    }

    async fn fetch(&self, content_id: &str) -> Result<Value, Self::Error> {
        let hash = Self::parse_content_id(content_id)?;
        if !self.stat(&hash).await? {
            return Err(anyhow!("blob {} not found", content_id).into());
        }
        let bytes = self.get(&hash).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
