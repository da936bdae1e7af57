use clap::Args;

use super::{stored_key_pair, KeyOpError};

/// Print the fingerprint of an identity's public key, for comparing out of band
#[derive(Args, Debug, Clone)]
pub struct Fingerprint {
    #[arg(long)]
    pub user: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Fingerprint {
    type Error = KeyOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await?;
        let user = services.state.user(self.user.as_deref())?;
        let key_pair = stored_key_pair(services, &user).await?;
        Ok(services.keys.get_key_fingerprint(&key_pair.public_key))
    }
}
