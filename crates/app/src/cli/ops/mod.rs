pub mod cache;
pub mod decrypt;
pub mod encrypt;
pub mod init;
pub mod keys;
pub mod lookup;
pub mod publish;
pub mod version;

pub use cache::Cache;
pub use decrypt::Decrypt;
pub use encrypt::Encrypt;
pub use init::Init;
pub use keys::Keys;
pub use lookup::Lookup;
pub use publish::Publish;
pub use version::Version;

use common::crypto::{ExportedPublicKey, PublicKey};

/// Render a public key as its JWK-style json followed by its fingerprint
pub(crate) fn describe_public_key(exported: &ExportedPublicKey, key: &PublicKey) -> String {
    let json = serde_json::to_string_pretty(exported).unwrap_or_else(|e| e.to_string());
    format!("{}\nFingerprint: {}", json, key.fingerprint())
}
