pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quill")]
#[command(about = "End-to-end encrypted direct messages: keys, discovery and encryption")]
pub struct Args {
    /// Path to the quill config directory (defaults to ~/.quill)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: crate::Command,
}
