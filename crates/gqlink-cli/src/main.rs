//! gqlink - CLI tool for credential-synchronized GraphQL transports.
//!
//! A thin wrapper over the `gqlink` library for manual exploration of a
//! GraphQL endpoint: store a token, run queries, and watch subscriptions
//! reconnect as the stored credentials change.

mod cli;
mod commands;
mod credentials;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use commands::{login, logout, query, status, subscribe};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let path = credentials::resolve(cli.credentials.as_deref())?;

    match cli.command {
        Commands::Login(args) => login::run(args, &path).await,
        Commands::Logout(args) => logout::run(args, &path).await,
        Commands::Status(args) => status::run(args, &path).await,
        Commands::Query(args) => query::run(args, &path).await,
        Commands::Subscribe(args) => subscribe::run(args, &path).await,
    }
}

fn init_logging(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}
