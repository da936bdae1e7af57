use clap::Args;

use super::KeyOpError;

#[derive(Args, Debug, Clone)]
pub struct Generate {
    /// Identity to generate a key pair for
    #[arg(long)]
    pub user: Option<String>,

    /// Replace an existing key pair
    #[arg(long)]
    pub force: bool,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Generate {
    type Error = KeyOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await?;
        let user = services.state.user(self.user.as_deref())?;

        if !self.force && services.keys.has_stored_keys(&user).await {
            return Err(KeyOpError::AlreadyExists(user));
        }

        // a replaced key must not be served from this device's publish record
        let key_pair = services.keys.generate_key_pair()?;
        services.registry.forget_published_key(&user).await?;
        services.keys.store_key_pair(&user, &key_pair).await?;

        Ok(format!(
            "Generated key pair for {}\nFingerprint: {}",
            user,
            services.keys.get_key_fingerprint(&key_pair.public_key)
        ))
    }
}
