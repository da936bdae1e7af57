//! Publication and discovery of public keys
//!
//! A user's public key is published as a [`PublicKeyRecord`] to a
//!  [`ContentStore`]; other devices resolve it through a local
//!  time-boxed cache, then a content id (given directly or found in a
//!  [`ProfileDirectory`]). Resolution never fails loudly: anything that
//!  goes wrong while looking up someone else's key is logged and
//!  reported as "unknown", and is never cached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::crypto::{ExportedPublicKey, PublicKey};

pub mod blobs_store;
pub mod cache;
pub mod content_store;
pub mod directory;

pub use blobs_store::{BlobsStore, BlobsStoreError};
pub use cache::{
    CacheStore, FileCacheStore, FileCacheStoreError, MemoryCacheStore, MemoryCacheStoreError,
};
pub use content_store::{ContentStore, MemoryContentStore, MemoryContentStoreError};
pub use directory::{MemoryDirectory, MemoryDirectoryError, Profile, ProfileDirectory};

/// Cache key of the address -> [`CacheEntry`] map
pub const PUBLIC_KEY_CACHE_KEY: &str = "quill_public_key_cache";
/// Cache key of the address -> content id map of keys this device published
pub const OWN_KEY_CID_KEY: &str = "quill_own_key_cid";
/// How long a resolved public key is trusted before it is fetched again
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const PUBLIC_KEY_RECORD_VERSION: u32 = 1;

/// Lowercase, trimmed form of an address used for every lookup
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),
    #[error("failed to publish public key: {0}")]
    Publish(String),
    #[error("cache store error: {0}")]
    Cache(String),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The document published to the content store: "this address's
///  current public key is X"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyRecord {
    pub address: String,
    pub public_key: ExportedPublicKey,
    /// Milliseconds since the unix epoch
    pub published_at: i64,
    /// Carried for consumers; nothing here acts on it yet
    pub version: u32,
}

/// A resolved public key, as kept in the local cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub public_key: ExportedPublicKey,
    pub content_id: String,
    /// Milliseconds since the unix epoch
    pub fetched_at: i64,
}

type CacheMap = HashMap<String, CacheEntry>;
type OwnKeyMap = HashMap<String, String>;

/// Publishes this device's public keys and resolves everyone else's
#[derive(Debug, Clone)]
pub struct PublicKeyRegistry<C: ContentStore, S: CacheStore, D: ProfileDirectory> {
    content_store: C,
    cache: S,
    directory: D,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<C: ContentStore, S: CacheStore, D: ProfileDirectory> PublicKeyRegistry<C, S, D> {
    pub fn new(content_store: C, cache: S, directory: D) -> Self {
        Self {
            content_store,
            cache,
            directory,
            clock: Arc::new(SystemClock),
            ttl: CACHE_TTL,
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn content_store(&self) -> &C {
        &self.content_store
    }

    pub fn cache(&self) -> &S {
        &self.cache
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Publish `public_key` as the current key of `address`.
    ///
    /// If this device already published a key for `address`, the
    ///  recorded content id is returned without touching the content
    ///  store. After a successful publish the key is cached, so an
    ///  immediate lookup of `address` returns it.
    pub async fn publish_public_key(
        &self,
        address: &str,
        public_key: &ExportedPublicKey,
    ) -> Result<String, RegistryError> {
        let address = normalize_address(address);
        if address.is_empty() {
            return Err(RegistryError::InvalidAddress(address));
        }

        let mut own: OwnKeyMap = self.read_map(OWN_KEY_CID_KEY).await;
        if let Some(content_id) = own.get(&address) {
            tracing::debug!(address, content_id, "public key already published");
            return Ok(content_id.clone());
        }

        let now = self.clock.now();
        let record = PublicKeyRecord {
            address: address.clone(),
            public_key: public_key.clone(),
            published_at: now.timestamp_millis(),
            version: PUBLIC_KEY_RECORD_VERSION,
        };
        let content_id = self
            .content_store
            .publish(&serde_json::to_value(&record)?)
            .await
            .map_err(|e| RegistryError::Publish(e.to_string()))?;
        tracing::info!(address, content_id, "published public key");

        own.insert(address.clone(), content_id.clone());
        if let Err(e) = self.write_map(OWN_KEY_CID_KEY, &own).await {
            tracing::warn!(address, "failed to record published content id: {}", e);
        }
        self.cache_entry(&address, public_key.clone(), content_id.clone(), now)
            .await;

        Ok(content_id)
    }

    /// Resolve the public key of `address` from the cache, or from the
    ///  record stored under `content_id` when one is given.
    ///
    /// Returns `None` on a cache miss with no content id and on any
    ///  fetch or validation failure.
    pub async fn fetch_public_key(
        &self,
        address: &str,
        content_id: Option<&str>,
    ) -> Option<ExportedPublicKey> {
        let address = normalize_address(address);
        if address.is_empty() {
            return None;
        }

        if let Some(entry) = self.cached_entry(&address).await {
            tracing::debug!(address, "public key cache hit");
            return Some(entry.public_key);
        }

        let content_id = content_id?;
        tracing::debug!(address, content_id, "public key cache miss, fetching");

        let value = match self.content_store.fetch(content_id).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(address, content_id, "failed to fetch public key: {}", e);
                return None;
            }
        };

        let public_key = match validate_record(&address, &value) {
            Ok(public_key) => public_key,
            Err(reason) => {
                tracing::warn!(address, content_id, "rejected public key record: {}", reason);
                return None;
            }
        };

        self.cache_entry(
            &address,
            public_key.clone(),
            content_id.to_string(),
            self.clock.now(),
        )
        .await;
        Some(public_key)
    }

    /// Resolve the public key of `address`: cache, then the content id
    ///  the profile directory has for it, then unknown
    pub async fn lookup_public_key_by_address(&self, address: &str) -> Option<ExportedPublicKey> {
        let address = normalize_address(address);
        if address.is_empty() {
            return None;
        }

        if let Some(entry) = self.cached_entry(&address).await {
            tracing::debug!(address, "public key cache hit");
            return Some(entry.public_key);
        }

        let profile = match self.directory.get_profile(&address).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(address, "profile directory lookup failed: {}", e);
                return None;
            }
        };

        let Some(content_id) = profile.and_then(|p| p.public_key_content_id) else {
            tracing::debug!(address, "no published public key in directory");
            return None;
        };

        self.fetch_public_key(&address, Some(&content_id)).await
    }

    pub async fn has_cached_public_key(&self, address: &str) -> bool {
        self.cached_entry(&normalize_address(address))
            .await
            .is_some()
    }

    /// Content id of the cached key of `address`, for sharing with a peer
    pub async fn get_cached_key_cid(&self, address: &str) -> Option<String> {
        self.cached_entry(&normalize_address(address))
            .await
            .map(|entry| entry.content_id)
    }

    /// Drop every cached public key. Records of keys this device
    ///  published are kept.
    pub async fn clear_public_key_cache(&self) -> Result<(), RegistryError> {
        self.cache
            .remove(PUBLIC_KEY_CACHE_KEY)
            .await
            .map_err(|e| RegistryError::Cache(e.to_string()))?;
        tracing::debug!("cleared public key cache");
        Ok(())
    }

    /// Content id this device published for `address`, if any
    pub async fn published_content_id(&self, address: &str) -> Option<String> {
        let own: OwnKeyMap = self.read_map(OWN_KEY_CID_KEY).await;
        own.get(&normalize_address(address)).cloned()
    }

    /// Forget that this device published a key for `address`, so the
    ///  next publish goes to the content store. Used after rotation.
    pub async fn forget_published_key(&self, address: &str) -> Result<(), RegistryError> {
        let address = normalize_address(address);

        let mut own: OwnKeyMap = self.read_map(OWN_KEY_CID_KEY).await;
        if own.remove(&address).is_some() {
            self.write_map(OWN_KEY_CID_KEY, &own).await?;
        }

        let mut cache: CacheMap = self.read_map(PUBLIC_KEY_CACHE_KEY).await;
        if cache.remove(&address).is_some() {
            self.write_map(PUBLIC_KEY_CACHE_KEY, &cache).await?;
        }
        Ok(())
    }

    /// The unexpired cache entry of `address`. An expired entry is
    ///  evicted on the way out.
    async fn cached_entry(&self, address: &str) -> Option<CacheEntry> {
        let mut cache: CacheMap = self.read_map(PUBLIC_KEY_CACHE_KEY).await;
        let entry = cache.get(address)?;

        if self.is_fresh(entry) {
            return Some(entry.clone());
        }

        tracing::debug!(address, "public key cache entry expired");
        cache.remove(address);
        if let Err(e) = self.write_map(PUBLIC_KEY_CACHE_KEY, &cache).await {
            tracing::warn!(address, "failed to evict expired cache entry: {}", e);
        }
        None
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        let age = self.clock.now().timestamp_millis() - entry.fetched_at;
        let ttl = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        // entries from the future (clock moved back) count as fresh
        age <= ttl
    }

    async fn cache_entry(
        &self,
        address: &str,
        public_key: ExportedPublicKey,
        content_id: String,
        fetched_at: DateTime<Utc>,
    ) {
        let mut cache: CacheMap = self.read_map(PUBLIC_KEY_CACHE_KEY).await;
        cache.insert(
            address.to_string(),
            CacheEntry {
                public_key,
                content_id,
                fetched_at: fetched_at.timestamp_millis(),
            },
        );
        if let Err(e) = self.write_map(PUBLIC_KEY_CACHE_KEY, &cache).await {
            tracing::warn!(address, "failed to cache public key: {}", e);
        }
    }

    /// Read a whole map from the cache store. Missing, unreadable and
    ///  corrupt maps all read as empty.
    async fn read_map<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let value = match self.cache.read(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return T::default(),
            Err(e) => {
                tracing::warn!(key, "failed to read cache: {}", e);
                return T::default();
            }
        };
        match serde_json::from_value(value) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(key, "cache contents are corrupt, ignoring: {}", e);
                T::default()
            }
        }
    }

    async fn write_map<T: Serialize>(&self, key: &str, map: &T) -> Result<(), RegistryError> {
        let value = serde_json::to_value(map)?;
        self.cache
            .write(key, &value)
            .await
            .map_err(|e| RegistryError::Cache(e.to_string()))
    }
}

/// Check a fetched record and pull out its public key.
///
/// The record must carry a `publicKey` that is a valid point on the
///  curve, and if it names an address it must be `address`.
fn validate_record(address: &str, value: &Value) -> Result<ExportedPublicKey, String> {
    let public_key = value
        .get("publicKey")
        .ok_or_else(|| "missing publicKey field".to_string())?;
    let public_key: ExportedPublicKey =
        serde_json::from_value(public_key.clone()).map_err(|e| e.to_string())?;
    PublicKey::import(&public_key).map_err(|e| e.to_string())?;

    if let Some(record_address) = value.get("address").and_then(Value::as_str) {
        if normalize_address(record_address) != address {
            return Err(format!("record is for address {:?}", record_address));
        }
    }
    Ok(public_key)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clock::ManualClock;
    use crate::crypto::KeyPair;
    use serde_json::json;

    type TestRegistry = PublicKeyRegistry<MemoryContentStore, MemoryCacheStore, MemoryDirectory>;

    fn registry() -> (TestRegistry, ManualClock) {
        let clock = ManualClock::default();
        let registry = PublicKeyRegistry::new(
            MemoryContentStore::new(),
            MemoryCacheStore::new(),
            MemoryDirectory::new(),
        )
        .with_clock(clock.clone());
        (registry, clock)
    }

    fn exported_key() -> ExportedPublicKey {
        KeyPair::generate().unwrap().public_key.export().unwrap()
    }

    #[tokio::test]
    async fn test_publish_is_idempotent() {
        let (registry, _) = registry();
        let key = exported_key();

        let first = registry.publish_public_key("alice", &key).await.unwrap();
        let second = registry.publish_public_key("ALICE ", &key).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.content_store().publish_count(), 1);
        assert_eq!(
            registry.published_content_id("alice").await.as_deref(),
            Some(first.as_str())
        );
    }

    #[tokio::test]
    async fn test_published_record_shape() {
        let (registry, clock) = registry();
        let key = exported_key();

        let content_id = registry.publish_public_key("alice", &key).await.unwrap();
        let value = registry.content_store().fetch(&content_id).await.unwrap();
        let record: PublicKeyRecord = serde_json::from_value(value.clone()).unwrap();

        assert_eq!(record.address, "alice");
        assert_eq!(record.public_key, key);
        assert_eq!(record.published_at, clock.now().timestamp_millis());
        assert_eq!(record.version, PUBLIC_KEY_RECORD_VERSION);
        assert!(value.get("publishedAt").is_some());
    }

    #[tokio::test]
    async fn test_publish_failure_propagates() {
        let (registry, _) = registry();
        registry.content_store().set_offline(true);

        let result = registry.publish_public_key("alice", &exported_key()).await;
        assert!(matches!(result, Err(RegistryError::Publish(_))));
        assert!(registry.published_content_id("alice").await.is_none());
        assert!(!registry.has_cached_public_key("alice").await);
    }

    #[tokio::test]
    async fn test_publish_rejects_empty_address() {
        let (registry, _) = registry();
        let result = registry.publish_public_key("   ", &exported_key()).await;
        assert!(matches!(result, Err(RegistryError::InvalidAddress(_))));
    }

    #[tokio::test]
    async fn test_publish_then_fetch_uses_cache() {
        let (registry, _) = registry();
        let key = exported_key();

        registry.publish_public_key("alice", &key).await.unwrap();
        assert_eq!(registry.fetch_public_key("alice", None).await, Some(key));
        assert_eq!(registry.content_store().fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_by_content_id_populates_cache() {
        let (registry, _) = registry();
        let key = exported_key();
        let record = json!({ "address": "bob", "publicKey": key, "publishedAt": 0, "version": 1 });
        let content_id = registry.content_store().publish(&record).await.unwrap();

        assert_eq!(registry.fetch_public_key("bob", None).await, None);
        assert_eq!(
            registry.fetch_public_key("bob", Some(&content_id)).await,
            Some(key.clone())
        );
        assert!(registry.has_cached_public_key("Bob").await);
        assert_eq!(
            registry.get_cached_key_cid("bob").await.as_deref(),
            Some(content_id.as_str())
        );

        // served from cache from here on
        assert_eq!(registry.fetch_public_key("bob", None).await, Some(key));
        assert_eq!(registry.content_store().fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_not_cached() {
        let (registry, _) = registry();
        let key = exported_key();
        let content_id = registry
            .content_store()
            .publish(&json!({ "address": "bob", "publicKey": key }))
            .await
            .unwrap();

        registry.content_store().set_offline(true);
        assert_eq!(registry.fetch_public_key("bob", Some(&content_id)).await, None);
        assert!(!registry.has_cached_public_key("bob").await);

        registry.content_store().set_offline(false);
        assert_eq!(
            registry.fetch_public_key("bob", Some(&content_id)).await,
            Some(key)
        );
    }

    #[tokio::test]
    async fn test_malformed_records_are_rejected() {
        let (registry, _) = registry();
        let store = registry.content_store();

        let missing = store.publish(&json!({ "address": "bob" })).await.unwrap();
        let not_a_key = store
            .publish(&json!({ "address": "bob", "publicKey": { "x": "AA", "y": "BB" } }))
            .await
            .unwrap();
        let not_json = store.insert_raw(b"<html>".to_vec());
        let other_address = store
            .publish(&json!({ "address": "mallory", "publicKey": exported_key() }))
            .await
            .unwrap();

        for content_id in [missing, not_a_key, not_json, other_address] {
            assert_eq!(registry.fetch_public_key("bob", Some(&content_id)).await, None);
        }
        assert!(!registry.has_cached_public_key("bob").await);
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let (registry, clock) = registry();
        let key = exported_key();
        let content_id = registry
            .content_store()
            .publish(&json!({ "address": "bob", "publicKey": key }))
            .await
            .unwrap();

        registry.fetch_public_key("bob", Some(&content_id)).await;
        assert_eq!(registry.content_store().fetch_count(), 1);

        clock.advance(CACHE_TTL - Duration::from_secs(1));
        assert!(registry.has_cached_public_key("bob").await);
        registry.fetch_public_key("bob", Some(&content_id)).await;
        assert_eq!(registry.content_store().fetch_count(), 1);

        clock.advance(Duration::from_secs(2));
        assert!(!registry.has_cached_public_key("bob").await);
        assert_eq!(registry.get_cached_key_cid("bob").await, None);
        assert_eq!(
            registry.fetch_public_key("bob", Some(&content_id)).await,
            Some(key)
        );
        assert_eq!(registry.content_store().fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted() {
        let (registry, clock) = registry();
        registry
            .publish_public_key("alice", &exported_key())
            .await
            .unwrap();

        clock.advance(CACHE_TTL + Duration::from_secs(1));
        assert!(!registry.has_cached_public_key("alice").await);

        let cache: CacheMap = registry.read_map(PUBLIC_KEY_CACHE_KEY).await;
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let (registry, clock) = registry();
        let registry = registry.with_ttl(Duration::from_secs(60));
        registry
            .publish_public_key("alice", &exported_key())
            .await
            .unwrap();

        clock.advance(Duration::from_secs(61));
        assert!(!registry.has_cached_public_key("alice").await);
    }

    #[tokio::test]
    async fn test_lookup_via_directory() {
        let (registry, _) = registry();
        let key = exported_key();

        assert_eq!(registry.lookup_public_key_by_address("bob").await, None);

        let content_id = registry
            .content_store()
            .publish(&json!({ "address": "bob", "publicKey": key }))
            .await
            .unwrap();
        registry
            .directory()
            .set_public_key_content_id("bob", &content_id);

        assert_eq!(
            registry.lookup_public_key_by_address("BOB").await,
            Some(key)
        );
        assert!(registry.has_cached_public_key("bob").await);
    }

    #[tokio::test]
    async fn test_lookup_directory_failure_is_none() {
        let (registry, _) = registry();
        registry.directory().set_unavailable(true);
        assert_eq!(registry.lookup_public_key_by_address("bob").await, None);
    }

    #[tokio::test]
    async fn test_cache_failure_degrades() {
        let (registry, _) = registry();
        let key = exported_key();
        let content_id = registry
            .content_store()
            .publish(&json!({ "address": "bob", "publicKey": key }))
            .await
            .unwrap();

        registry.cache().set_unavailable(true);
        assert_eq!(
            registry.fetch_public_key("bob", Some(&content_id)).await,
            Some(key)
        );
        assert!(!registry.has_cached_public_key("bob").await);
        assert!(registry.clear_public_key_cache().await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_cache_reads_as_empty() {
        let (registry, _) = registry();
        registry
            .cache()
            .write(PUBLIC_KEY_CACHE_KEY, &json!(["not", "a", "map"]))
            .await
            .unwrap();
        assert!(!registry.has_cached_public_key("bob").await);

        // and is overwritten by the next successful resolution
        registry
            .publish_public_key("bob", &exported_key())
            .await
            .unwrap();
        assert!(registry.has_cached_public_key("bob").await);
    }

    #[tokio::test]
    async fn test_clear_cache_keeps_published() {
        let (registry, _) = registry();
        let key = exported_key();
        let content_id = registry.publish_public_key("alice", &key).await.unwrap();

        registry.clear_public_key_cache().await.unwrap();
        assert!(!registry.has_cached_public_key("alice").await);

        let again = registry.publish_public_key("alice", &key).await.unwrap();
        assert_eq!(again, content_id);
        assert_eq!(registry.content_store().publish_count(), 1);
    }

    #[tokio::test]
    async fn test_forget_published_key() {
        let (registry, _) = registry();
        registry
            .publish_public_key("alice", &exported_key())
            .await
            .unwrap();

        registry.forget_published_key("alice").await.unwrap();
        assert!(registry.published_content_id("alice").await.is_none());
        assert!(!registry.has_cached_public_key("alice").await);

        let rotated = exported_key();
        registry.publish_public_key("alice", &rotated).await.unwrap();
        assert_eq!(registry.content_store().publish_count(), 2);
        assert_eq!(
            registry.fetch_public_key("alice", None).await,
            Some(rotated)
        );
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("  Alice@Example.COM\n"), "alice@example.com");
    }
}
