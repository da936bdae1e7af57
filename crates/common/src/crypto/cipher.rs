//! Per-message authenticated encryption between two key pairs
//!
//! A message from Alice to Bob is sealed as follows:
//! 1. ECDH between Alice's private key and Bob's public key yields an AES-256 key
//! 2. A fresh random 96-bit IV is drawn for this message only
//! 3. The UTF-8 plaintext is sealed with AES-256-GCM under that key and IV
//! 4. Ciphertext and IV are base64 encoded and Alice's exported public key is
//!    attached, so Bob can re-derive the same key without a directory lookup
//!
//! Opening runs the same ECDH from Bob's side. A wrong recipient key,
//!  or any tampering with ciphertext or IV, fails the GCM tag check.
//!
//! This is a static-key design: every message between the same two
//!  parties uses the same derived key, distinguished only by its IV.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::keys::{ExportedPublicKey, KeyError, PublicKey, SecretKey};
use super::provider::{CryptoError, CryptoProvider, P256Provider, IV_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message could not be decrypted")]
    Decryption,
    #[error("encryption failed: {0}")]
    Encryption(CryptoError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One sealed message.
///
/// `ciphertext` includes the GCM tag. Both byte fields are standard base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedMessage {
    pub ciphertext: String,
    pub iv: String,
    pub sender_public_key: ExportedPublicKey,
}

impl EncryptedMessage {
    pub fn to_json(&self) -> Result<String, CipherError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CipherError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Seals and opens [`EncryptedMessage`]s.
///
/// Stateless apart from the provider; cryptographic failures are
///  returned to the caller and never retried here.
#[derive(Debug, Clone, Default)]
pub struct MessageCipher<P: CryptoProvider = P256Provider> {
    provider: P,
}

impl MessageCipher<P256Provider> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: CryptoProvider> MessageCipher<P> {
    pub fn with_provider(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Encrypt `plaintext` from the sender to the recipient.
    ///
    /// A new IV is drawn on every call, so sealing the same plaintext
    ///  twice yields different `iv` and `ciphertext` values.
    ///
    /// # Errors
    ///
    /// * `CipherError::Key` - the sender public key does not belong to the
    ///   sender private key, or cannot be exported
    /// * `CipherError::Encryption` - the RNG or the AEAD failed
    pub fn encrypt_message(
        &self,
        plaintext: &str,
        sender_private_key: &SecretKey,
        sender_public_key: &PublicKey,
        recipient_public_key: &PublicKey,
    ) -> Result<EncryptedMessage, CipherError> {
        if sender_private_key.public() != *sender_public_key {
            return Err(KeyError::InvalidKeyFormat(
                "sender public key does not belong to sender private key".to_string(),
            )
            .into());
        }

        let key = self
            .provider
            .derive_aes_key(sender_private_key, recipient_public_key);

        let mut iv = [0u8; IV_SIZE];
        self.provider
            .random_bytes(&mut iv)
            .map_err(CipherError::Encryption)?;

        let ciphertext = self
            .provider
            .aes_gcm_encrypt(&key, &iv, plaintext.as_bytes())
            .map_err(CipherError::Encryption)?;

        Ok(EncryptedMessage {
            ciphertext: STANDARD.encode(ciphertext),
            iv: STANDARD.encode(iv),
            sender_public_key: sender_public_key.export()?,
        })
    }

    /// Decrypt a message addressed to the holder of `recipient_private_key`.
    ///
    /// # Errors
    ///
    /// * `CipherError::Key` - the embedded sender key is not a valid P-256 key
    /// * `CipherError::Malformed` - ciphertext or IV are not valid base64, the
    ///   IV has the wrong length, or the plaintext is not UTF-8
    /// * `CipherError::Decryption` - the tag did not verify: wrong recipient,
    ///   or the message was tampered with
    pub fn decrypt_message(
        &self,
        message: &EncryptedMessage,
        recipient_private_key: &SecretKey,
    ) -> Result<String, CipherError> {
        let sender_public_key = PublicKey::import(&message.sender_public_key)?;
        let key = self
            .provider
            .derive_aes_key(recipient_private_key, &sender_public_key);

        let iv = STANDARD
            .decode(&message.iv)
            .map_err(|e| CipherError::Malformed(format!("iv is not base64: {e}")))?;
        if iv.len() != IV_SIZE {
            return Err(CipherError::Malformed(format!(
                "invalid iv size, expected {}, got {}",
                IV_SIZE,
                iv.len()
            )));
        }
        let ciphertext = STANDARD
            .decode(&message.ciphertext)
            .map_err(|e| CipherError::Malformed(format!("ciphertext is not base64: {e}")))?;

        let plaintext = self
            .provider
            .aes_gcm_decrypt(&key, &iv, &ciphertext)
            .map_err(|_| CipherError::Decryption)?;

        String::from_utf8(plaintext)
            .map_err(|_| CipherError::Malformed("plaintext is not valid utf-8".to_string()))
    }

    /// Fingerprint of a conversation partner's key, for out-of-band verification
    pub fn fingerprint(&self, public_key: &PublicKey) -> String {
        self.provider.fingerprint(public_key)
    }
}
