use clap::Args;

use super::KeyOpError;

/// Replace an identity's key pair with a new one.
///
/// The new public key still has to be published; peers keep using
///  the old one until their cached copy expires.
#[derive(Args, Debug, Clone)]
pub struct Rotate {
    #[arg(long)]
    pub user: Option<String>,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Rotate {
    type Error = KeyOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await?;
        let user = services.state.user(self.user.as_deref())?;

        services.registry.forget_published_key(&user).await?;
        let key_pair = services.keys.rotate(&user).await?;

        Ok(format!(
            "Rotated key pair for {}\nFingerprint: {}\nRun 'quill publish' to publish the new key",
            user,
            services.keys.get_key_fingerprint(&key_pair.public_key)
        ))
    }
}
