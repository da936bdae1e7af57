use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::normalize_address;

/// What the profile directory knows about an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub address: String,
    /// Content id of the last public key record this address published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_content_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Profile {
    pub fn new(address: &str) -> Self {
        Self {
            address: normalize_address(address),
            public_key_content_id: None,
            display_name: None,
        }
    }
}

/// External directory mapping a user identity to its profile
#[async_trait]
pub trait ProfileDirectory: Send + Sync + Debug + Clone + 'static {
    type Error: Display + Debug + Send + Sync;

    /// `Ok(None)` when the directory has never heard of `address`
    async fn get_profile(&self, address: &str) -> Result<Option<Profile>, Self::Error>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryDirectoryError {
    #[error("directory is unavailable")]
    Unavailable,
}

#[derive(Debug, Default)]
struct MemoryDirectoryInner {
    profiles: HashMap<String, Profile>,
    unavailable: bool,
}

/// In-memory profile directory keyed by normalized address
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<MemoryDirectoryInner>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_profile(&self, profile: Profile) {
        let address = normalize_address(&profile.address);
        self.inner.write().profiles.insert(address, profile);
    }

    /// Record `content_id` as the public key record of `address`,
    ///  creating the profile if needed
    pub fn set_public_key_content_id(&self, address: &str, content_id: impl Into<String>) {
        let address = normalize_address(address);
        let mut inner = self.inner.write();
        let profile = inner
            .profiles
            .entry(address.clone())
            .or_insert_with(|| Profile::new(&address));
        profile.public_key_content_id = Some(content_id.into());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().unavailable = unavailable;
    }
}

#[async_trait]
impl ProfileDirectory for MemoryDirectory {
    type Error = MemoryDirectoryError;

    async fn get_profile(&self, address: &str) -> Result<Option<Profile>, Self::Error> {
        let inner = self.inner.read();
        if inner.unavailable {
            return Err(MemoryDirectoryError::Unavailable);
        }
        Ok(inner.profiles.get(&normalize_address(address)).cloned())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() {
        let directory = MemoryDirectory::new();
        directory.set_public_key_content_id("Bob@Example.com", "cid-1");

        let profile = directory
            .get_profile("  bob@example.COM ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.address, "bob@example.com");
        assert_eq!(profile.public_key_content_id.as_deref(), Some("cid-1"));
    }

    #[tokio::test]
    async fn test_update_keeps_profile() {
        let directory = MemoryDirectory::new();
        directory.set_profile(Profile {
            address: "bob".to_string(),
            public_key_content_id: None,
            display_name: Some("Bob".to_string()),
        });
        directory.set_public_key_content_id("bob", "cid-2");

        let profile = directory.get_profile("bob").await.unwrap().unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Bob"));
        assert_eq!(profile.public_key_content_id.as_deref(), Some("cid-2"));
    }

    #[tokio::test]
    async fn test_unknown_and_unavailable() {
        let directory = MemoryDirectory::new();
        assert_eq!(directory.get_profile("nobody").await.unwrap(), None);

        directory.set_unavailable(true);
        assert!(directory.get_profile("nobody").await.is_err());
    }
}
