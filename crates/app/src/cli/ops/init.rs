use clap::Args;

use crate::state::{AppConfig, AppState};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Identity to act as when --user is not given
    #[arg(long)]
    pub default_user: Option<String>,

    /// How long resolved public keys are cached, in seconds (default: 86400)
    #[arg(long)]
    pub cache_ttl_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] crate::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = AppConfig {
            default_user: self.default_user.clone(),
            ..AppConfig::default()
        };
        if let Some(ttl) = self.cache_ttl_secs {
            config.cache_ttl_secs = ttl;
        }

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let output = format!(
            "Initialized quill directory at: {}\n\
             - Keys: {}\n\
             - Blobs: {}\n\
             - Cache: {}\n\
             - Directory: {}\n\
             - Config: {}\n\
             - Default user: {}\n\
             - Cache TTL: {}s",
            state.quill_dir.display(),
            state.keys_db_path.display(),
            state.blobs_path.display(),
            state.cache_path.display(),
            state.directory_path.display(),
            state.config_path.display(),
            state.config.default_user.as_deref().unwrap_or("(none)"),
            state.config.cache_ttl_secs,
        );

        Ok(output)
    }
}
