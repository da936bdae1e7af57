use clap::Args;

use common::crypto::{CipherError, EncryptedMessage, MessageCipher};

use super::keys::{stored_key_pair, KeyOpError};

/// Decrypt a message produced by 'quill encrypt'
#[derive(Args, Debug, Clone)]
pub struct Decrypt {
    /// Identity the message was sent to
    #[arg(long)]
    pub user: Option<String>,

    /// The encrypted message json
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error(transparent)]
    Keys(#[from] KeyOpError),
    #[error("message could not be decrypted: {0}")]
    Cipher(#[from] CipherError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Decrypt {
    type Error = DecryptError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let services = ctx.services().await.map_err(KeyOpError::from)?;
        let user = services
            .state
            .user(self.user.as_deref())
            .map_err(KeyOpError::from)?;
        let recipient = stored_key_pair(services, &user).await?;

        let message = EncryptedMessage::from_json(&self.message)?;
        Ok(MessageCipher::new().decrypt_message(&message, &recipient.private_key)?)
    }
}
