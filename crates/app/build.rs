use std::env;
use std::process::Command;

/// Run a command and return its trimmed stdout, if it succeeded
fn command_output(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    Some(stdout.trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=.git/HEAD");

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=QUILL_BUILD_PROFILE={}", profile);

    // CI_BUILD_REF, then git, then the crate version
    let revision = env::var("CI_BUILD_REF")
        .ok()
        .filter(|r| !r.is_empty())
        .or_else(|| command_output("git", &["describe", "--always", "--dirty", "--tags"]))
        .unwrap_or_else(|| env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".into()));
    println!("cargo:rustc-env=QUILL_REVISION={}", revision);

    println!(
        "cargo:rustc-env=QUILL_BUILD_TIMESTAMP={}",
        chrono::Utc::now().to_rfc3339()
    );
}
