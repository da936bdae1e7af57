use clap::Args;

use common::crypto::{CipherError, KeyError, MessageCipher, PublicKey};

use super::keys::{stored_key_pair, KeyOpError};

/// Encrypt a message to another identity and print it as json
#[derive(Args, Debug, Clone)]
pub struct Encrypt {
    /// Identity sending the message
    #[arg(long)]
    pub user: Option<String>,

    /// Address of the recipient
    #[arg(long)]
    pub to: String,

    /// The message
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error(transparent)]
    Keys(#[from] KeyOpError),
    #[error("recipient key is unusable: {0}")]
    Key(#[from] KeyError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("no public key found for {0}. Ask them to run 'quill publish'")]
    UnknownRecipient(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Encrypt {
    type Error = EncryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await.map_err(KeyOpError::from)?;
        let user = services
            .state
            .user(self.user.as_deref())
            .map_err(KeyOpError::from)?;
        let sender = stored_key_pair(services, &user).await?;

        let recipient = services
            .registry
            .lookup_public_key_by_address(&self.to)
            .await
            .ok_or_else(|| EncryptError::UnknownRecipient(self.to.clone()))?;
        let recipient = PublicKey::import(&recipient)?;

        let message = MessageCipher::new().encrypt_message(
            &self.message,
            &sender.private_key,
            &sender.public_key,
            &recipient,
        )?;
        tracing::debug!(
            to = %self.to,
            recipient = %recipient.fingerprint(),
            "encrypted message"
        );

        Ok(message.to_json()?)
    }
}
