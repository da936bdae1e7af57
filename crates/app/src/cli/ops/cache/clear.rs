use clap::Args;

use common::registry::RegistryError;

use crate::state::StateError;

/// Forget every cached public key. Published keys are not affected.
#[derive(Args, Debug, Clone)]
pub struct Clear;

#[derive(Debug, thiserror::Error)]
pub enum ClearError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Clear {
    type Error = ClearError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await?;
        services.registry.clear_public_key_cache().await?;
        Ok("Cleared public key cache".to_string())
    }
}
