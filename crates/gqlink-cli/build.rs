//! Stamps `GQLINK_VERSION` for `gqlink --version`.
//!
//! Inside a git checkout the version is the package version followed by
//! the short commit, with `-dirty` for uncommitted changes. Elsewhere
//! (crates.io tarballs, vendored builds) it is the package version alone.

use std::path::Path;
use std::process::Command;

fn main() {
    let workspace = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let head = workspace.join(".git/HEAD");
    if head.exists() {
        println!("cargo:rerun-if-changed={}", head.display());
        println!("cargo:rerun-if-changed={}", workspace.join(".git/index").display());
    }

    let package = env!("CARGO_PKG_VERSION");
    let version = match commit(&workspace) {
        Some(commit) => format!("{} ({})", package, commit),
        None => package.to_string(),
    };

    println!("cargo:rustc-env=GQLINK_VERSION={}", version);
}

fn commit(workspace: &Path) -> Option<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(workspace)
        .args(["describe", "--always", "--dirty", "--abbrev=10", "--exclude=*"])
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let commit = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!commit.is_empty()).then_some(commit)
}
