use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

/// Device-local store of whole JSON blobs under string keys.
///
/// There are no partial updates: callers read a blob, change it,
///  and write the whole thing back.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync;

    async fn read(&self, key: &str) -> Result<Option<Value>, Self::Error>;

    async fn write(&self, key: &str, value: &Value) -> Result<(), Self::Error>;

    /// Removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryCacheStoreError {
    #[error("cache store is unavailable")]
    Unavailable,
}

#[derive(Debug, Default)]
struct MemoryCacheStoreInner {
    entries: HashMap<String, Value>,
    unavailable: bool,
}

/// In-memory cache store. Can be made unavailable to exercise failure paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    inner: Arc<Mutex<MemoryCacheStoreInner>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    type Error = MemoryCacheStoreError;

    async fn read(&self, key: &str) -> Result<Option<Value>, Self::Error> {
        let inner = self.inner.lock();
        if inner.unavailable {
            return Err(MemoryCacheStoreError::Unavailable);
        }
        Ok(inner.entries.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &Value) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock();
        if inner.unavailable {
            return Err(MemoryCacheStoreError::Unavailable);
        }
        inner.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock();
        if inner.unavailable {
            return Err(MemoryCacheStoreError::Unavailable);
        }
        inner.entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileCacheStoreError {
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cache store keeping one `<key>.json` file per key in a directory
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, FileCacheStoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(FileCacheStoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl CacheStore for FileCacheStore {
    type Error = FileCacheStoreError;

    async fn read(&self, key: &str) -> Result<Option<Value>, Self::Error> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &Value) -> Result<(), Self::Error> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // write then rename so readers never see a half-written blob
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(value)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), Self::Error> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
