//! Query command implementation.

use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Args;

use super::EndpointArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub target: EndpointArgs,
}

pub async fn run(args: QueryArgs, credentials: &Path) -> Result<()> {
    let link = args
        .target
        .link(credentials)?
        .build()
        .context("Invalid link configuration")?;
    let operation = args.target.operation()?;

    let response = link.query(operation).await.context("Request failed");
    link.close();
    let response = response?;

    output::json_pretty(&response)?;

    if response.has_errors() {
        for error in &response.errors {
            output::graphql_error(error);
        }
        bail!("Response carried {} GraphQL error(s)", response.errors.len());
    }

    Ok(())
}
