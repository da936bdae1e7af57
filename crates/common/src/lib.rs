/**
 * Wall-clock abstraction so cache expiry
 *  can be driven by tests.
 */
pub mod clock;
/**
 * Cryptographic types and operations.
 *  - P-256 key pairs and their portable export form
 *  - ECDH key agreement and AES-256-GCM message sealing
 *  - Public key fingerprints
 */
pub mod crypto;
/**
 * Durable, device-local storage of each user's
 *  long-term key pair.
 */
pub mod keystore;
/**
 * Publication of public keys to a content-addressed
 *  store and cached resolution of other users' keys.
 */
pub mod registry;

pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::crypto::{
        CipherError, EncryptedMessage, ExportedPublicKey, KeyError, KeyPair, MessageCipher,
        PublicKey, SecretKey,
    };
    pub use crate::keystore::{KeyPairManager, KeyStore, MemoryKeyStore, SqliteKeyStore};
    pub use crate::registry::{
        BlobsStore, CacheStore, ContentStore, FileCacheStore, MemoryCacheStore,
        MemoryContentStore, MemoryDirectory, ProfileDirectory, PublicKeyRegistry,
    };
}
