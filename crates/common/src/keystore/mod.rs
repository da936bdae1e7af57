//! Durable storage of one long-term key pair per local user identity
//!
//! [`KeyPairManager`] owns the key lifecycle (generate, store, load,
//!  delete) on top of any [`KeyStore`]. Read paths never fail: a missing
//!  or corrupt record is logged and reported as absent, since callers
//!  already handle that case by generating a new key pair.

use std::fmt::{Debug, Display};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{
    CryptoError, CryptoProvider, ExportedPrivateKey, ExportedPublicKey, KeyError, KeyPair,
    P256Provider, PublicKey, SecretKey,
};

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryKeyStore, MemoryKeyStoreError};
pub use sqlite::{SqliteKeyStore, SqliteKeyStoreError};

/// Name of the store all key pairs are kept under
pub const KEY_STORE_NAME: &str = "quill-keys";

/// A device-local key-value store for serialized key pairs.
///
/// Records are opaque strings to the store; parsing happens in
///  [`KeyPairManager`] so that a corrupt record can be told apart
///  from a store failure.
#[async_trait]
pub trait KeyStore: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync;

    /// Fetch the record stored under `id`, if any
    async fn get(&self, id: &str) -> Result<Option<String>, Self::Error>;

    /// Insert or replace the record stored under `id`
    async fn put(&self, id: &str, record: String) -> Result<(), Self::Error>;

    /// Remove the record stored under `id`. Removing a missing id is not an error.
    async fn delete(&self, id: &str) -> Result<(), Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum KeyPairManagerError {
    #[error("key store error: {0}")]
    Store(String),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("record encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serialized form of a key pair as kept in the key store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyRecord {
    pub public_key: ExportedPublicKey,
    pub private_key: ExportedPrivateKey,
    pub created_at: DateTime<Utc>,
}

impl StoredKeyRecord {
    fn from_key_pair(key_pair: &KeyPair) -> Result<Self, KeyError> {
        Ok(Self {
            public_key: key_pair.public_key.export()?,
            private_key: key_pair.private_key.export()?,
            created_at: Utc::now(),
        })
    }

    fn into_key_pair(self) -> Result<KeyPair, KeyError> {
        let private_key = SecretKey::import(&self.private_key)?;
        let public_key = PublicKey::import(&self.public_key)?;
        if public_key != private_key.public() {
            return Err(KeyError::InvalidKeyFormat(
                "stored public key does not match stored private key".to_string(),
            ));
        }
        Ok(KeyPair {
            public_key,
            private_key,
        })
    }
}

/// Generates, exports and persists long-term key pairs
#[derive(Debug, Clone)]
pub struct KeyPairManager<K: KeyStore, P: CryptoProvider = P256Provider> {
    store: K,
    provider: P,
}

impl<K: KeyStore> KeyPairManager<K, P256Provider> {
    pub fn new(store: K) -> Self {
        Self::with_provider(store, P256Provider)
    }
}

impl<K: KeyStore, P: CryptoProvider> KeyPairManager<K, P> {
    pub fn with_provider(store: K, provider: P) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    /// Generate a fresh P-256 key pair. Only fails if the platform RNG does.
    pub fn generate_key_pair(&self) -> Result<KeyPair, KeyPairManagerError> {
        Ok(self.provider.generate_ecdh_key_pair()?)
    }

    pub fn export_public_key(&self, key: &PublicKey) -> Result<ExportedPublicKey, KeyError> {
        key.export()
    }

    /// Import untrusted public key material, rejecting points not on the curve
    pub fn import_public_key(&self, exported: &ExportedPublicKey) -> Result<PublicKey, KeyError> {
        PublicKey::import(exported)
    }

    pub fn export_private_key(&self, key: &SecretKey) -> Result<ExportedPrivateKey, KeyError> {
        key.export()
    }

    pub fn import_private_key(&self, exported: &ExportedPrivateKey) -> Result<SecretKey, KeyError> {
        SecretKey::import(exported)
    }

    pub fn get_key_fingerprint(&self, key: &PublicKey) -> String {
        self.provider.fingerprint(key)
    }

    /// Persist `key_pair` as the key pair of `user_id`, replacing any previous one
    pub async fn store_key_pair(
        &self,
        user_id: &str,
        key_pair: &KeyPair,
    ) -> Result<(), KeyPairManagerError> {
        let record = StoredKeyRecord::from_key_pair(key_pair)?;
        let json = serde_json::to_string(&record)?;
        self.store
            .put(user_id, json)
            .await
            .map_err(|e| KeyPairManagerError::Store(e.to_string()))?;
        tracing::debug!(
            user_id,
            fingerprint = %key_pair.public_key.fingerprint(),
            "stored key pair"
        );
        Ok(())
    }

    /// Load the key pair of `user_id`.
    ///
    /// Returns `None` when nothing is stored, when the store fails, and
    ///  when the stored record cannot be parsed back into a key pair.
    pub async fn get_stored_key_pair(&self, user_id: &str) -> Option<KeyPair> {
        let json = match self.store.get(user_id).await {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(user_id, "failed to read stored key pair: {}", e);
                return None;
            }
        };

        let record: StoredKeyRecord = match serde_json::from_str(&json) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(user_id, "stored key pair record is corrupt: {}", e);
                return None;
            }
        };

        match record.into_key_pair() {
            Ok(key_pair) => Some(key_pair),
            Err(e) => {
                tracing::warn!(user_id, "stored key pair is invalid: {}", e);
                None
            }
        }
    }

    /// Whether a usable key pair is stored for `user_id`
    pub async fn has_stored_keys(&self, user_id: &str) -> bool {
        self.get_stored_key_pair(user_id).await.is_some()
    }

    pub async fn delete_stored_keys(&self, user_id: &str) -> Result<(), KeyPairManagerError> {
        self.store
            .delete(user_id)
            .await
            .map_err(|e| KeyPairManagerError::Store(e.to_string()))?;
        tracing::debug!(user_id, "deleted stored key pair");
        Ok(())
    }

    /// Session start: return the stored key pair for `user_id`, or
    ///  generate and store a new one if there is none
    pub async fn load_or_generate(&self, user_id: &str) -> Result<KeyPair, KeyPairManagerError> {
        if let Some(key_pair) = self.get_stored_key_pair(user_id).await {
            return Ok(key_pair);
        }
        tracing::info!(user_id, "no usable key pair stored, generating a new one");
        let key_pair = self.generate_key_pair()?;
        self.store_key_pair(user_id, &key_pair).await?;
        Ok(key_pair)
    }

    /// Replace the key pair of `user_id` with a freshly generated one.
    ///
    /// The old pair stays stored until the new one is written over it.
    pub async fn rotate(&self, user_id: &str) -> Result<KeyPair, KeyPairManagerError> {
        let key_pair = self.generate_key_pair()?;
        self.store_key_pair(user_id, &key_pair).await?;
        tracing::info!(
            user_id,
            fingerprint = %key_pair.public_key.fingerprint(),
            "rotated key pair"
        );
        Ok(key_pair)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn manager() -> KeyPairManager<MemoryKeyStore> {
        KeyPairManager::new(MemoryKeyStore::new())
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let manager = manager();
        let key_pair = manager.generate_key_pair().unwrap();

        manager.store_key_pair("alice", &key_pair).await.unwrap();
        let loaded = manager.get_stored_key_pair("alice").await.unwrap();
        assert_eq!(loaded.public_key, key_pair.public_key);
        assert_eq!(loaded.private_key.public(), key_pair.public_key);
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let manager = manager();
        assert!(manager.get_stored_key_pair("nobody").await.is_none());
        assert!(!manager.has_stored_keys("nobody").await);
    }

    #[tokio::test]
    async fn test_has_and_delete() {
        let manager = manager();
        let key_pair = manager.generate_key_pair().unwrap();
        manager.store_key_pair("alice", &key_pair).await.unwrap();
        assert!(manager.has_stored_keys("alice").await);

        manager.delete_stored_keys("alice").await.unwrap();
        assert!(!manager.has_stored_keys("alice").await);
        assert!(manager.get_stored_key_pair("alice").await.is_none());

        // deleting again is fine
        manager.delete_stored_keys("alice").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_record_is_none() {
        let manager = manager();
        manager
            .store()
            .put("alice", "{not json".to_string())
            .await
            .unwrap();
        assert!(manager.get_stored_key_pair("alice").await.is_none());
        assert!(!manager.has_stored_keys("alice").await);
    }

    #[tokio::test]
    async fn test_mismatched_record_is_none() {
        let manager = manager();
        let a = manager.generate_key_pair().unwrap();
        let b = manager.generate_key_pair().unwrap();
        let record = StoredKeyRecord {
            public_key: b.public_key.export().unwrap(),
            private_key: a.private_key.export().unwrap(),
            created_at: Utc::now(),
        };
        manager
            .store()
            .put("alice", serde_json::to_string(&record).unwrap())
            .await
            .unwrap();
        assert!(manager.get_stored_key_pair("alice").await.is_none());
    }

    #[tokio::test]
    async fn test_load_or_generate_is_stable() {
        let manager = manager();
        let first = manager.load_or_generate("alice").await.unwrap();
        let second = manager.load_or_generate("alice").await.unwrap();
        assert_eq!(first.public_key, second.public_key);
    }

    #[tokio::test]
    async fn test_rotate_replaces_key() {
        let manager = manager();
        let first = manager.load_or_generate("alice").await.unwrap();
        let rotated = manager.rotate("alice").await.unwrap();
        assert_ne!(first.public_key, rotated.public_key);

        let loaded = manager.get_stored_key_pair("alice").await.unwrap();
        assert_eq!(loaded.public_key, rotated.public_key);
    }

    #[tokio::test]
    async fn test_failed_rotate_keeps_old_key() {
        let manager = manager();
        let first = manager.load_or_generate("alice").await.unwrap();

        manager.store().set_read_only(true);
        assert!(matches!(
            manager.rotate("alice").await,
            Err(KeyPairManagerError::Store(_))
        ));

        let loaded = manager.get_stored_key_pair("alice").await.unwrap();
        assert_eq!(loaded.public_key, first.public_key);
    }

    #[tokio::test]
    async fn test_identities_are_isolated() {
        let manager = manager();
        let alice = manager.load_or_generate("alice").await.unwrap();
        let bob = manager.load_or_generate("bob").await.unwrap();
        assert_ne!(alice.public_key, bob.public_key);

        manager.delete_stored_keys("alice").await.unwrap();
        assert!(manager.has_stored_keys("bob").await);
    }
}
