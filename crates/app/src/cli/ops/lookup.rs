use clap::Args;

use common::crypto::{KeyError, PublicKey};

use super::describe_public_key;
use crate::state::StateError;

/// Resolve someone's public key: cache, then --cid, then the directory
#[derive(Args, Debug, Clone)]
pub struct Lookup {
    /// Address to resolve
    pub address: String,

    /// Content id of the address's public key record
    #[arg(long)]
    pub cid: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("no public key found for {0}")]
    NotFound(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Lookup {
    type Error = LookupError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await?;
        let registry = &services.registry;

        let exported = match &self.cid {
            Some(cid) => registry.fetch_public_key(&self.address, Some(cid)).await,
            None => registry.lookup_public_key_by_address(&self.address).await,
        }
        .ok_or_else(|| LookupError::NotFound(self.address.clone()))?;

        let key = PublicKey::import(&exported)?;
        let mut output = describe_public_key(&exported, &key);
        if let Some(cid) = registry.get_cached_key_cid(&self.address).await {
            output.push_str(&format!("\nContent id: {}", cid));
        }
        Ok(output)
    }
}
