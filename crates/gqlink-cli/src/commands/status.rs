//! Status command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use gqlink::{SessionContext, SignInState};

use crate::credentials;
use crate::output;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print the session snapshot as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StatusArgs, path: &Path) -> Result<()> {
    let source = credentials::open(path)?;
    let session = SessionContext::new(source.as_ref());

    if args.json {
        return output::json_line(&session.snapshot());
    }

    let state = match session.signed_in() {
        SignInState::SignedIn => "yes",
        SignInState::SignedOut => "no",
        SignInState::Unknown => "unknown",
    };
    output::field("Signed in", state);
    output::field("Credentials", path.display());

    let stored = gqlink_file::load(path).context("Failed to read credentials")?;
    if let Some(saved_at) = stored.and_then(|stored| stored.saved_at) {
        output::field("Saved", saved_at.to_rfc3339());
    }

    Ok(())
}
