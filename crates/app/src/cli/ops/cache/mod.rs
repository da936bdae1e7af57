use clap::{Args, Subcommand};

pub mod clear;

use crate::cli::op::Op;

crate::command_enum! {
    (Clear, clear::Clear),
}

pub type CacheCommand = Command;

/// Manage the local public key cache
#[derive(Args, Debug, Clone)]
pub struct Cache {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[async_trait::async_trait]
impl Op for Cache {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}
