use clap::Args;

use super::{stored_key_pair, KeyOpError};
use crate::cli::ops::describe_public_key;

/// Print the exported public key of an identity
#[derive(Args, Debug, Clone)]
pub struct Show {
    #[arg(long)]
    pub user: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Show {
    type Error = KeyOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await?;
        let user = services.state.user(self.user.as_deref())?;
        let key_pair = stored_key_pair(services, &user).await?;
        let exported = services.keys.export_public_key(&key_pair.public_key)?;
        Ok(describe_public_key(&exported, &key_pair.public_key))
    }
}
