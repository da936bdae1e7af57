//! Profile directory kept in a single JSON file.
//!
//! Stands in for the social layer's profile service: `quill publish`
//!  records the content id of a user's key here, and lookups on the
//!  same machine find it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::registry::{normalize_address, Profile, ProfileDirectory};

#[derive(Debug, thiserror::Error)]
pub enum LocalDirectoryError {
    #[error("directory i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("directory json error: {0}")]
    Json(#[from] serde_json::Error),
}

type Profiles = BTreeMap<String, Profile>;

#[derive(Debug, Clone)]
pub struct LocalDirectory {
    path: PathBuf,
}

impl LocalDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Profiles, LocalDirectoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Profiles::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, profiles: &Profiles) -> Result<(), LocalDirectoryError> {
        tokio::fs::write(&self.path, serde_json::to_vec_pretty(profiles)?).await?;
        Ok(())
    }

    /// Point the profile of `address` at a published public key record
    pub async fn set_public_key_content_id(
        &self,
        address: &str,
        content_id: &str,
    ) -> Result<(), LocalDirectoryError> {
        let address = normalize_address(address);
        let mut profiles = self.read_all().await?;
        profiles
            .entry(address.clone())
            .or_insert_with(|| Profile::new(&address))
            .public_key_content_id = Some(content_id.to_string());
        self.write_all(&profiles).await?;
        tracing::debug!(address, content_id, "recorded public key in local directory");
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for LocalDirectory {
    type Error = LocalDirectoryError;

    async fn get_profile(&self, address: &str) -> Result<Option<Profile>, Self::Error> {
        let mut profiles = self.read_all().await?;
        Ok(profiles.remove(&normalize_address(address)))
    }
}
