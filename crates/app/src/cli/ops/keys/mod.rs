use clap::{Args, Subcommand};

pub mod delete;
pub mod fingerprint;
pub mod generate;
pub mod rotate;
pub mod show;

use common::crypto::{KeyError, KeyPair};
use common::keystore::KeyPairManagerError;
use common::registry::RegistryError;

use crate::cli::op::Op;
use crate::state::{Services, StateError};

crate::command_enum! {
    (Generate, generate::Generate),
    (Show, show::Show),
    (Fingerprint, fingerprint::Fingerprint),
    (Delete, delete::Delete),
    (Rotate, rotate::Rotate),
}

pub type KeysCommand = Command;

/// Manage the long-term key pair of a local identity
#[derive(Args, Debug, Clone)]
pub struct Keys {
    #[command(subcommand)]
    pub command: KeysCommand,
}

#[async_trait::async_trait]
impl Op for Keys {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum KeyOpError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Manager(#[from] KeyPairManagerError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("no key pair stored for {0}. Run 'quill keys generate' first")]
    NoKeys(String),
    #[error("a key pair is already stored for {0}. Use --force to replace it")]
    AlreadyExists(String),
}

/// The stored key pair of `user`, or [`KeyOpError::NoKeys`]
pub(crate) async fn stored_key_pair(services: &Services, user: &str) -> Result<KeyPair, KeyOpError> {
    services
        .keys
        .get_stored_key_pair(user)
        .await
        .ok_or_else(|| KeyOpError::NoKeys(user.to_string()))
}
