//! quill - end-to-end encrypted direct message keys from the command line
//!
//! Wires the common crate's key manager, public key registry and message
//!  cipher to on-disk stores under ~/.quill.

mod cli;
mod directory;
mod state;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Cache, Decrypt, Encrypt, Init, Keys, Lookup, Publish, Version};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

command_enum! {
    (Init, Init),
    (Keys, Keys),
    (Publish, Publish),
    (Lookup, Lookup),
    (Encrypt, Encrypt),
    (Decrypt, Decrypt),
    (Cache, Cache),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr so command output on stdout stays pipeable
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let log_level: tracing::Level = args.log_level.parse().unwrap_or(tracing::Level::WARN);
    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(non_blocking_writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();

    let ctx = cli::op::OpContext::new(args.config_path);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // flush buffered logs before exiting
    drop(guard);
    std::process::exit(code);
}

#[cfg(test)]
mod test {
    use super::*;
    use common::keystore::KeyStore;
    use tempfile::TempDir;

    async fn run(ctx: &cli::op::OpContext, argv: &[&str]) -> Result<String, OpError> {
        let args = Args::try_parse_from(std::iter::once("quill").chain(argv.iter().copied()))
            .unwrap();
        args.command.execute(ctx).await.map(|output| output.to_string())
    }

    #[tokio::test]
    async fn test_conversation_through_cli() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = cli::op::OpContext::new(Some(temp_dir.path().join("quill")));

        run(&ctx, &["init", "--default-user", "alice"]).await.unwrap();
        run(&ctx, &["keys", "generate"]).await.unwrap();
        run(&ctx, &["keys", "generate", "--user", "bob"]).await.unwrap();

        let content_id = run(&ctx, &["publish", "--user", "bob"]).await.unwrap();
        assert_eq!(content_id.len(), 64);
        assert_eq!(
            run(&ctx, &["publish", "--user", "bob"]).await.unwrap(),
            content_id
        );

        // resolve through the directory from a cold cache
        run(&ctx, &["cache", "clear"]).await.unwrap();
        let lookup = run(&ctx, &["lookup", "Bob"]).await.unwrap();
        let bob_fingerprint = run(&ctx, &["keys", "fingerprint", "--user", "bob"])
            .await
            .unwrap();
        assert!(lookup.contains(&bob_fingerprint));
        assert!(lookup.contains(&content_id));

        let message = run(&ctx, &["encrypt", "--to", "bob", "hello"]).await.unwrap();
        let plaintext = run(&ctx, &["decrypt", "--user", "bob", &message])
            .await
            .unwrap();
        assert_eq!(plaintext, "hello");

        // alice cannot open what she sent to bob
        assert!(run(&ctx, &["decrypt", &message]).await.is_err());
    }

    #[tokio::test]
    async fn test_key_lifecycle_through_cli() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = cli::op::OpContext::new(Some(temp_dir.path().to_path_buf()));
        run(&ctx, &["init"]).await.unwrap();

        assert!(run(&ctx, &["keys", "show"]).await.is_err());
        assert!(run(&ctx, &["keys", "show", "--user", "carol"]).await.is_err());

        run(&ctx, &["keys", "generate", "--user", "carol"]).await.unwrap();
        assert!(run(&ctx, &["keys", "generate", "--user", "carol"])
            .await
            .is_err());

        let before = run(&ctx, &["keys", "fingerprint", "--user", "carol"])
            .await
            .unwrap();
        let first_cid = run(&ctx, &["publish", "--user", "carol"]).await.unwrap();

        run(&ctx, &["keys", "rotate", "--user", "carol"]).await.unwrap();
        let after = run(&ctx, &["keys", "fingerprint", "--user", "carol"])
            .await
            .unwrap();
        assert_ne!(before, after);

        let second_cid = run(&ctx, &["publish", "--user", "carol"]).await.unwrap();
        assert_ne!(first_cid, second_cid);

        run(&ctx, &["keys", "delete", "--user", "carol"]).await.unwrap();
        assert!(run(&ctx, &["keys", "show", "--user", "carol"]).await.is_err());
    }

    #[tokio::test]
    async fn test_forced_generate_publishes_new_key() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = cli::op::OpContext::new(Some(temp_dir.path().to_path_buf()));
        run(&ctx, &["init", "--default-user", "alice"]).await.unwrap();
        run(&ctx, &["keys", "generate"]).await.unwrap();
        run(&ctx, &["keys", "generate", "--user", "bob"]).await.unwrap();

        let first_cid = run(&ctx, &["publish", "--user", "bob"]).await.unwrap();
        run(&ctx, &["keys", "generate", "--user", "bob", "--force"])
            .await
            .unwrap();
        let second_cid = run(&ctx, &["publish", "--user", "bob"]).await.unwrap();
        assert_ne!(first_cid, second_cid);

        let lookup = run(&ctx, &["lookup", "bob"]).await.unwrap();
        assert!(lookup.contains(&second_cid));

        let message = run(&ctx, &["encrypt", "--to", "bob", "after replace"])
            .await
            .unwrap();
        let plaintext = run(&ctx, &["decrypt", "--user", "bob", &message])
            .await
            .unwrap();
        assert_eq!(plaintext, "after replace");
    }

    #[tokio::test]
    async fn test_delete_removes_unreadable_record() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = cli::op::OpContext::new(Some(temp_dir.path().to_path_buf()));
        run(&ctx, &["init"]).await.unwrap();

        let services = ctx.services().await.unwrap();
        services
            .keys
            .store()
            .put("dave", "{not json".to_string())
            .await
            .unwrap();

        run(&ctx, &["keys", "delete", "--user", "dave"]).await.unwrap();
        assert_eq!(services.keys.store().get("dave").await.unwrap(), None);

        // nothing left to delete
        run(&ctx, &["keys", "delete", "--user", "dave"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_unknown_and_uninitialized() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = cli::op::OpContext::new(Some(temp_dir.path().to_path_buf()));
        assert!(run(&ctx, &["lookup", "nobody"]).await.is_err());

        // a failed load is not cached by the context
        run(&ctx, &["init"]).await.unwrap();
        assert!(run(&ctx, &["lookup", "nobody"]).await.is_err());
        assert!(run(&ctx, &["version"]).await.unwrap().starts_with("quill "));
    }
}
