//! Shared test utilities for key exchange integration tests
#![allow(dead_code)]

use std::collections::HashMap;

use common::clock::ManualClock;
use common::crypto::KeyPair;
use common::keystore::{KeyPairManager, MemoryKeyStore};
use common::registry::{MemoryCacheStore, MemoryContentStore, MemoryDirectory, PublicKeyRegistry};

pub type TestRegistry = PublicKeyRegistry<MemoryContentStore, MemoryCacheStore, MemoryDirectory>;

/// One user on their own device: a key store, a local cache and a
///  long-term key pair
pub struct TestUser {
    pub address: String,
    pub keys: KeyPairManager<MemoryKeyStore>,
    pub registry: TestRegistry,
    pub key_pair: KeyPair,
}

impl TestUser {
    /// Publish this user's public key and record it in the shared
    ///  directory, the way a profile update would
    pub async fn publish(&self) -> String {
        let exported = self.key_pair.public_key.export().unwrap();
        let content_id = self
            .registry
            .publish_public_key(&self.address, &exported)
            .await
            .unwrap();
        self.registry
            .directory()
            .set_public_key_content_id(&self.address, &content_id);
        content_id
    }
}

/// A set of users sharing one content store, one profile directory
///  and one clock. Each user gets a separate cache and key store.
pub struct TestNetwork {
    pub content_store: MemoryContentStore,
    pub directory: MemoryDirectory,
    pub clock: ManualClock,
    users: HashMap<String, TestUser>,
}

impl TestNetwork {
    pub fn new() -> Self {
        Self {
            content_store: MemoryContentStore::new(),
            directory: MemoryDirectory::new(),
            clock: ManualClock::default(),
            users: HashMap::new(),
        }
    }

    /// Add a user, generating and storing their key pair
    pub async fn add_user(&mut self, address: &str) -> &TestUser {
        assert!(
            !self.users.contains_key(address),
            "user '{}' already exists",
            address
        );

        let keys = KeyPairManager::new(MemoryKeyStore::new());
        let key_pair = keys.load_or_generate(address).await.unwrap();
        let registry = PublicKeyRegistry::new(
            self.content_store.clone(),
            MemoryCacheStore::new(),
            self.directory.clone(),
        )
        .with_clock(self.clock.clone());

        self.users.insert(
            address.to_string(),
            TestUser {
                address: address.to_string(),
                keys,
                registry,
                key_pair,
            },
        );
        self.user(address)
    }

    pub fn user(&self, address: &str) -> &TestUser {
        self.users
            .get(address)
            .unwrap_or_else(|| panic!("no user '{}'", address))
    }
}

/// Initialise tracing for a test binary. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
