//! Cryptographic primitives for Quill direct messages
//!
//! - **Identity**: one long-term P-256 key pair per user (`KeyPair`),
//!   exportable to a JWK-shaped form for storage and publication
//! - **Key agreement**: ECDH between one party's private key and the
//!   other party's public key, used directly as an AES-256 key
//! - **Encryption**: AES-256-GCM with a fresh 96-bit IV per message
//! - **Verification**: short SHA-256 fingerprints of public keys for
//!   comparing identities out of band
//!
//! # Security Model
//!
//! Keys are static: there is no ratcheting and no forward secrecy. Every
//!  message between the same two parties is sealed under the same derived
//!  key, so IV uniqueness is what keeps GCM safe. IVs are always drawn
//!  from the OS RNG and never supplied by callers.

mod cipher;
mod keys;
mod provider;

pub use cipher::{CipherError, EncryptedMessage, MessageCipher};
pub use keys::{
    fingerprints_match, ExportedPrivateKey, ExportedPublicKey, KeyError, KeyPair, PublicKey,
    SecretKey, CURVE_NAME, FINGERPRINT_BYTES, KEY_TYPE, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE,
};
pub use provider::{
    CryptoError, CryptoProvider, P256Provider, SharedKey, AES_KEY_SIZE, IV_SIZE, TAG_SIZE,
};
