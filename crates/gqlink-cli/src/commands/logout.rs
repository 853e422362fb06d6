//! Logout command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use crate::output;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs, credentials: &Path) -> Result<()> {
    let removed = gqlink_file::clear(credentials).context("Failed to clear credentials")?;

    if removed {
        output::done("Logged out");
    } else {
        output::done("Not logged in");
    }

    Ok(())
}
