use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Size of a P-256 private scalar in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of a single P-256 field element (one affine coordinate) in bytes
pub const COORDINATE_SIZE: usize = 32;
/// Size of an uncompressed SEC1 encoded public key (`0x04 || x || y`)
pub const PUBLIC_KEY_SIZE: usize = 1 + 2 * COORDINATE_SIZE;
/// Number of digest bytes shown in a fingerprint
pub const FINGERPRINT_BYTES: usize = 8;

/// JWK key type for elliptic curve keys
pub const KEY_TYPE: &str = "EC";
/// JWK curve name for NIST P-256
pub const CURVE_NAME: &str = "P-256";

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Key material is structurally invalid, or does not describe
    ///  a point / scalar on P-256
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),
    /// The platform RNG failed while generating a key
    #[error("key generation failed: {0}")]
    Generation(String),
}

fn default_kty() -> String {
    KEY_TYPE.to_string()
}

fn default_crv() -> String {
    CURVE_NAME.to_string()
}

/// Portable form of a P-256 public key.
///
/// JWK shaped: `x` and `y` are the affine coordinates as
///  base64url (unpadded) big-endian field elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExportedPublicKey {
    #[serde(default = "default_kty")]
    pub kty: String,
    #[serde(default = "default_crv")]
    pub crv: String,
    pub x: String,
    pub y: String,
}

/// Portable form of a P-256 private key.
///
/// Contains the raw private scalar `d`. This is secret material and
///  must only ever be written to device-local storage.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedPrivateKey {
    #[serde(default = "default_kty")]
    pub kty: String,
    #[serde(default = "default_crv")]
    pub crv: String,
    pub x: String,
    pub y: String,
    pub d: String,
}

impl fmt::Debug for ExportedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedPrivateKey")
            .field("crv", &self.crv)
            .field("x", &self.x)
            .field("y", &self.y)
            .finish_non_exhaustive()
    }
}

fn check_curve(kty: &str, crv: &str) -> Result<(), KeyError> {
    if kty != KEY_TYPE {
        return Err(KeyError::InvalidKeyFormat(format!(
            "unsupported key type {kty}, expected {KEY_TYPE}"
        )));
    }
    if crv != CURVE_NAME {
        return Err(KeyError::InvalidKeyFormat(format!(
            "unsupported curve {crv}, expected {CURVE_NAME}"
        )));
    }
    Ok(())
}

fn decode_field(name: &str, value: &str) -> Result<FieldBytes, KeyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| KeyError::InvalidKeyFormat(format!("{name} is not base64url: {e}")))?;
    if bytes.len() != COORDINATE_SIZE {
        return Err(KeyError::InvalidKeyFormat(format!(
            "{name} has invalid size, expected {}, got {}",
            COORDINATE_SIZE,
            bytes.len()
        )));
    }
    Ok(*FieldBytes::from_slice(&bytes))
}

/// Public half of a P-256 key pair.
///
/// Used as the recipient key for key agreement and as the
///  identity that peers verify by [`PublicKey::fingerprint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(p256::PublicKey);

impl From<p256::PublicKey> for PublicKey {
    fn from(key: p256::PublicKey) -> Self {
        PublicKey(key)
    }
}

impl PublicKey {
    pub(crate) fn inner(&self) -> &p256::PublicKey {
        &self.0
    }

    /// Parse a public key from its SEC1 encoding (compressed or uncompressed)
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        p256::PublicKey::from_sec1_bytes(bytes)
            .map(PublicKey)
            .map_err(|_| KeyError::InvalidKeyFormat("invalid SEC1 public key".to_string()))
    }

    /// Uncompressed SEC1 encoding, `0x04 || x || y`
    pub fn to_sec1_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.0.to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        out
    }

    /// Export the public key into its portable coordinate form
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] if the encoded point
    ///  does not carry both affine coordinates.
    pub fn export(&self) -> Result<ExportedPublicKey, KeyError> {
        let point = self.0.to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (x, y),
            _ => {
                return Err(KeyError::InvalidKeyFormat(
                    "public key is missing curve coordinates".to_string(),
                ))
            }
        };
        Ok(ExportedPublicKey {
            kty: default_kty(),
            crv: default_crv(),
            x: URL_SAFE_NO_PAD.encode(x),
            y: URL_SAFE_NO_PAD.encode(y),
        })
    }

    /// Import a public key from its portable coordinate form.
    ///
    /// This is the boundary for untrusted key material: coordinates that
    ///  do not describe a point on P-256 are rejected.
    pub fn import(exported: &ExportedPublicKey) -> Result<Self, KeyError> {
        check_curve(&exported.kty, &exported.crv)?;
        let x = decode_field("x", &exported.x)?;
        let y = decode_field("y", &exported.y)?;
        let point = EncodedPoint::from_affine_coordinates(&x, &y, false);
        Option::<p256::PublicKey>::from(p256::PublicKey::from_encoded_point(&point))
            .map(PublicKey)
            .ok_or_else(|| {
                KeyError::InvalidKeyFormat("coordinates are not a point on P-256".to_string())
            })
    }

    /// Short human-verifiable digest of this key.
    ///
    /// SHA-256 over the uncompressed SEC1 bytes, truncated to
    ///  eight bytes and rendered as `AB:CD:EF:...`.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.to_sec1_bytes());
        format_fingerprint(&digest[..FINGERPRINT_BYTES])
    }
}

pub(crate) fn format_fingerprint(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Compare two public keys by fingerprint, as a user would when
///  verifying a conversation partner out of band.
pub fn fingerprints_match(a: &PublicKey, b: &PublicKey) -> bool {
    a.fingerprint() == b.fingerprint()
}

/// Private half of a P-256 key pair.
///
/// Zeroized on drop. Never leaves the device except through
///  [`SecretKey::export`] into a local key store.
#[derive(Clone)]
pub struct SecretKey(p256::SecretKey);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SecretKey")
            .field(&self.public().fingerprint())
            .finish()
    }
}

impl SecretKey {
    /// Generate a new secret key from the OS RNG
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Generation`] if the platform RNG is unavailable.
    pub fn generate() -> Result<Self, KeyError> {
        loop {
            let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
            OsRng
                .try_fill_bytes(&mut bytes[..])
                .map_err(|e| KeyError::Generation(e.to_string()))?;
            // out-of-range scalars are rejected and redrawn
            if let Ok(key) = p256::SecretKey::from_bytes(FieldBytes::from_slice(&bytes[..])) {
                return Ok(SecretKey(key));
            }
        }
    }

    pub(crate) fn inner(&self) -> &p256::SecretKey {
        &self.0
    }

    /// Derive the public key from this secret key
    pub fn public(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Export the full private key, including the raw scalar
    pub fn export(&self) -> Result<ExportedPrivateKey, KeyError> {
        let public = self.public().export()?;
        let d = Zeroizing::new(self.0.to_bytes());
        Ok(ExportedPrivateKey {
            kty: public.kty,
            crv: public.crv,
            x: public.x,
            y: public.y,
            d: URL_SAFE_NO_PAD.encode(d.as_slice()),
        })
    }

    /// Import a private key previously produced by [`SecretKey::export`]
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::InvalidKeyFormat`] if the scalar is malformed
    ///  or out of range, or if the embedded coordinates do not belong
    ///  to the scalar.
    pub fn import(exported: &ExportedPrivateKey) -> Result<Self, KeyError> {
        check_curve(&exported.kty, &exported.crv)?;
        let d = Zeroizing::new(decode_field("d", &exported.d)?);
        let key = p256::SecretKey::from_bytes(&d)
            .map(SecretKey)
            .map_err(|_| KeyError::InvalidKeyFormat("d is not a valid P-256 scalar".to_string()))?;

        let claimed = PublicKey::import(&ExportedPublicKey {
            kty: exported.kty.clone(),
            crv: exported.crv.clone(),
            x: exported.x.clone(),
            y: exported.y.clone(),
        })?;
        if claimed != key.public() {
            return Err(KeyError::InvalidKeyFormat(
                "public coordinates do not match private scalar".to_string(),
            ));
        }
        Ok(key)
    }
}

/// A long-term P-256 key pair for one user identity
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: SecretKey,
}

impl From<SecretKey> for KeyPair {
    fn from(private_key: SecretKey) -> Self {
        Self {
            public_key: private_key.public(),
            private_key,
        }
    }
}

impl KeyPair {
    /// Generate a fresh key pair suitable for ECDH
    pub fn generate() -> Result<Self, KeyError> {
        SecretKey::generate().map(Self::from)
    }
}
