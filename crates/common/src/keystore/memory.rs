use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::KeyStore;

/// In-memory key store using a HashMap
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
    read_only: Arc<AtomicBool>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryKeyStoreError {
    #[error("memory key store error: {0}")]
    Internal(String),
    #[error("memory key store is read-only")]
    ReadOnly,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make writes and deletes fail, as a full or locked disk would
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), MemoryKeyStoreError> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(MemoryKeyStoreError::ReadOnly);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    type Error = MemoryKeyStoreError;

    async fn get(&self, id: &str) -> Result<Option<String>, Self::Error> {
        let inner = self.inner.read().map_err(|e| {
            MemoryKeyStoreError::Internal(format!("failed to acquire read lock: {}", e))
        })?;
        Ok(inner.get(id).cloned())
    }

    async fn put(&self, id: &str, record: String) -> Result<(), Self::Error> {
        self.check_writable()?;
        let mut inner = self.inner.write().map_err(|e| {
            MemoryKeyStoreError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        inner.insert(id.to_string(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), Self::Error> {
        self.check_writable()?;
        let mut inner = self.inner.write().map_err(|e| {
            MemoryKeyStoreError::Internal(format!("failed to acquire write lock: {}", e))
        })?;
        inner.remove(id);
        Ok(())
    }
}
