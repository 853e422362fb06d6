use std::path::Path;
use std::process::{Command, Output};

/// Run the CLI against an isolated credentials file.
pub fn run_cli(args: &[&str], credentials: &Path) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gqlink"));
    cmd.args(args);
    cmd.env("GQLINK_CREDENTIALS", credentials);
    cmd.env_remove("GQLINK_ENDPOINT");
    cmd.env_remove("RUST_LOG");
    cmd.output().expect("Failed to execute CLI")
}

/// Run the CLI and expect success.
pub fn run_cli_success(args: &[&str], credentials: &Path) -> String {
    let output = run_cli(args, credentials);
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!("CLI command failed: {:?}\nstderr: {}", args, stderr);
    }
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Run the CLI off the async runtime so mock servers keep answering.
#[allow(dead_code)]
pub async fn run_cli_async(args: Vec<String>, credentials: &Path) -> Output {
    let credentials = credentials.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_cli(&args, &credentials)
    })
    .await
    .expect("CLI task panicked")
}
