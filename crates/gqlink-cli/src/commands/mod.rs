//! Subcommand implementations.

pub mod login;
pub mod logout;
pub mod query;
pub mod status;
pub mod subscribe;

use anyhow::{Context, Result, anyhow};
use clap::Args;
use serde_json::{Map, Value};

use gqlink::{Link, LinkBuilder};
use gqlink_core::Operation;

use crate::credentials;

/// Arguments shared by commands that talk to an endpoint.
#[derive(Args, Debug)]
pub struct EndpointArgs {
    /// GraphQL endpoint URL
    #[arg(long, env = "GQLINK_ENDPOINT")]
    pub endpoint: String,

    /// Extra header sent with every operation (name=value)
    #[arg(long = "header", value_name = "NAME=VALUE", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Role header sent while signed out
    #[arg(long, default_value = gqlink::DEFAULT_PUBLIC_ROLE)]
    pub role: String,

    /// Operation variables as a JSON object
    #[arg(long)]
    pub variables: Option<String>,

    /// Operation to run when the document defines several
    #[arg(long)]
    pub operation_name: Option<String>,

    /// GraphQL document
    pub document: String,
}

impl EndpointArgs {
    /// Builder for a link authenticated from the credentials file.
    pub fn link(&self, credentials: &std::path::Path) -> Result<LinkBuilder> {
        let source = credentials::open_dyn(credentials)?;

        let builder = self
            .headers
            .iter()
            .fold(Link::builder(&self.endpoint), |builder, (name, value)| {
                builder.header(name, value)
            });

        Ok(builder.public_role(&self.role).credentials(source))
    }

    /// The operation described by the arguments.
    pub fn operation(&self) -> Result<Operation> {
        let mut operation = Operation::new(&self.document);

        if let Some(variables) = &self.variables {
            let variables: Map<String, Value> =
                serde_json::from_str(variables).context("Variables must be a JSON object")?;
            operation = operation.with_variables(variables);
        }
        if let Some(name) = &self.operation_name {
            operation = operation.with_operation_name(name);
        }

        Ok(operation)
    }
}

fn parse_header(s: &str) -> Result<(String, String)> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got '{}'", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("header name is empty"));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
