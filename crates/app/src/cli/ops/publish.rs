use clap::Args;

use common::crypto::KeyError;
use common::registry::RegistryError;

use super::keys::{stored_key_pair, KeyOpError};
use crate::directory::LocalDirectoryError;

/// Publish an identity's public key and record it in the local directory
#[derive(Args, Debug, Clone)]
pub struct Publish {
    #[arg(long)]
    pub user: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Keys(#[from] KeyOpError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("published, but failed to update the directory: {0}")]
    Directory(#[from] LocalDirectoryError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Publish {
    type Error = PublishError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await.map_err(KeyOpError::from)?;
        let user = services
            .state
            .user(self.user.as_deref())
            .map_err(KeyOpError::from)?;
        let key_pair = stored_key_pair(services, &user).await?;

        let exported = key_pair.public_key.export()?;
        let content_id = services
            .registry
            .publish_public_key(&user, &exported)
            .await?;
        services
            .registry
            .directory()
            .set_public_key_content_id(&user, &content_id)
            .await?;

        Ok(content_id)
    }
}
