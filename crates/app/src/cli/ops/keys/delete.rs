use clap::Args;

use super::KeyOpError;

/// Delete the stored key pair of an identity. Deleting a missing pair is not an error.
#[derive(Args, Debug, Clone)]
pub struct Delete {
    #[arg(long)]
    pub user: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Delete {
    type Error = KeyOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await?;
        let user = services.state.user(self.user.as_deref())?;

        // unreadable records are deleted too
        services.registry.forget_published_key(&user).await?;
        services.keys.delete_stored_keys(&user).await?;

        Ok(format!("Deleted key pair for {}", user))
    }
}
