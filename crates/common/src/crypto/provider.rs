//! Pluggable cryptographic primitives
//!
//! Everything above this module talks to a [`CryptoProvider`] rather than
//!  to a specific crypto library. [`P256Provider`] is the RustCrypto
//!  implementation: `p256` for ECDH, `aes-gcm` for AEAD, `sha2` for
//!  digests and the OS RNG via `rand_core`.

use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::keys::{format_fingerprint, KeyError, KeyPair, PublicKey, SecretKey, FINGERPRINT_BYTES};

/// Size of an AES-GCM initialization vector in bytes (96 bits)
pub const IV_SIZE: usize = 12;
/// Size of an AES-256 key in bytes
pub const AES_KEY_SIZE: usize = 32;
/// Size of the AES-GCM authentication tag appended to ciphertexts
pub const TAG_SIZE: usize = 16;
/// Size of a SHA-256 digest in bytes
pub const SHA256_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("random source failed: {0}")]
    Random(String),
    #[error("invalid iv size, expected {IV_SIZE}, got {0}")]
    InvalidIv(usize),
    #[error("encrypt error")]
    Encrypt,
    #[error("decrypt error")]
    Decrypt,
}

/// AES-256 key derived by ECDH between two key pairs.
///
/// Non-extractable: there is no public accessor for the key bytes,
///  so calling code can use the key but never exfiltrate it.
pub struct SharedKey(Zeroizing<[u8; AES_KEY_SIZE]>);

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedKey(..)")
    }
}

impl SharedKey {
    fn bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// The primitive operations the key system is built on
pub trait CryptoProvider: Send + Sync + fmt::Debug {
    /// Generate a fresh long-term key pair usable for key agreement
    fn generate_ecdh_key_pair(&self) -> Result<KeyPair, CryptoError>;

    /// ECDH between `private_key` and `public_key`, used directly as an AES-256 key.
    ///  Symmetric: `derive(a.priv, b.pub) == derive(b.priv, a.pub)`.
    fn derive_aes_key(&self, private_key: &SecretKey, public_key: &PublicKey) -> SharedKey;

    /// Encrypt under AES-256-GCM. Output is `ciphertext || tag`.
    fn aes_gcm_encrypt(
        &self,
        key: &SharedKey,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt and authenticate `ciphertext || tag` under AES-256-GCM
    fn aes_gcm_decrypt(
        &self,
        key: &SharedKey,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    fn sha256(&self, data: &[u8]) -> [u8; SHA256_SIZE];

    /// Fill `buf` from a cryptographically secure source
    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), CryptoError>;

    /// Truncated, hex-grouped digest of the raw public key bytes
    fn fingerprint(&self, public_key: &PublicKey) -> String {
        let digest = self.sha256(&public_key.to_sec1_bytes());
        format_fingerprint(&digest[..FINGERPRINT_BYTES])
    }
}

/// [`CryptoProvider`] backed by the RustCrypto crates
#[derive(Debug, Clone, Copy, Default)]
pub struct P256Provider;

impl P256Provider {
    fn cipher(key: &SharedKey) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()))
    }

    fn check_iv(iv: &[u8]) -> Result<(), CryptoError> {
        if iv.len() != IV_SIZE {
            return Err(CryptoError::InvalidIv(iv.len()));
        }
        Ok(())
    }
}

impl CryptoProvider for P256Provider {
    fn generate_ecdh_key_pair(&self) -> Result<KeyPair, CryptoError> {
        Ok(KeyPair::generate()?)
    }

    fn derive_aes_key(&self, private_key: &SecretKey, public_key: &PublicKey) -> SharedKey {
        let shared = p256::ecdh::diffie_hellman(
            private_key.inner().to_nonzero_scalar(),
            public_key.inner().as_affine(),
        );
        let mut bytes = Zeroizing::new([0u8; AES_KEY_SIZE]);
        bytes.copy_from_slice(shared.raw_secret_bytes().as_slice());
        SharedKey(bytes)
    }

    fn aes_gcm_encrypt(
        &self,
        key: &SharedKey,
        iv: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        Self::check_iv(iv)?;
        Self::cipher(key)
            .encrypt(Nonce::from_slice(iv), plaintext)
            .map_err(|_| CryptoError::Encrypt)
    }

    fn aes_gcm_decrypt(
        &self,
        key: &SharedKey,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        Self::check_iv(iv)?;
        Self::cipher(key)
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }

    fn sha256(&self, data: &[u8]) -> [u8; SHA256_SIZE] {
        Sha256::digest(data).into()
    }

    fn random_bytes(&self, buf: &mut [u8]) -> Result<(), CryptoError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CryptoError::Random(e.to_string()))
    }
}
