//! Login command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args;

use crate::output;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Bearer token to store
    #[arg(long)]
    pub token: String,
}

pub async fn run(args: LoginArgs, credentials: &Path) -> Result<()> {
    let token = args.token.trim();
    if token.is_empty() {
        bail!("Token must not be empty");
    }

    let stored = gqlink_file::save(credentials, token).context("Failed to save credentials")?;

    output::done("Logged in successfully");
    println!();
    output::field("Credentials", credentials.display());
    if let Some(saved_at) = stored.saved_at {
        output::field("Saved", saved_at.to_rfc3339());
    }

    Ok(())
}
