//! CLI tests for storing and inspecting credentials.

mod common;

use tempfile::TempDir;

use common::{run_cli, run_cli_success};

#[test]
fn status_without_credentials_is_signed_out() {
    let temp_dir = TempDir::new().unwrap();
    let credentials = temp_dir.path().join("credentials.json");

    let stdout = run_cli_success(&["status", "--json"], &credentials);
    let snapshot: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();

    assert_eq!(snapshot, serde_json::json!({"signedIn": false}));
}

#[test]
fn login_then_status() {
    let temp_dir = TempDir::new().unwrap();
    let credentials = temp_dir.path().join("nested").join("credentials.json");

    let stdout = run_cli_success(&["login", "--token", "abc"], &credentials);
    assert!(stdout.contains("Logged in successfully"));

    let stdout = run_cli_success(&["status", "--json"], &credentials);
    let snapshot: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(snapshot["signedIn"], true);

    let stdout = run_cli_success(&["status"], &credentials);
    assert!(stdout.contains("yes"));
}

#[test]
fn login_writes_token_file() {
    let temp_dir = TempDir::new().unwrap();
    let credentials = temp_dir.path().join("credentials.json");

    run_cli_success(&["login", "--token", "abc"], &credentials);

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&credentials).unwrap()).unwrap();
    assert_eq!(stored["token"], "abc");
    assert!(stored["saved_at"].is_string());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&credentials).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn logout_signs_out() {
    let temp_dir = TempDir::new().unwrap();
    let credentials = temp_dir.path().join("credentials.json");

    run_cli_success(&["login", "--token", "abc"], &credentials);
    let stdout = run_cli_success(&["logout"], &credentials);
    assert!(stdout.contains("Logged out"));
    assert!(!credentials.exists());

    let stdout = run_cli_success(&["logout"], &credentials);
    assert!(stdout.contains("Not logged in"));

    let stdout = run_cli_success(&["status", "--json"], &credentials);
    assert!(stdout.contains(r#""signedIn":false"#));
}

#[test]
fn empty_token_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let credentials = temp_dir.path().join("credentials.json");

    let output = run_cli(&["login", "--token", "  "], &credentials);
    assert!(!output.status.success());
    assert!(!credentials.exists());
}
