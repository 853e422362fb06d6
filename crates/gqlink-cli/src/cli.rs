//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{login, logout, query, status, subscribe};

/// GraphQL client that keeps its transports in step with a stored token.
#[derive(Parser, Debug)]
#[command(name = "gqlink")]
#[command(author, version = env!("GQLINK_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Credentials file (defaults to the user data directory)
    #[arg(long, env = "GQLINK_CREDENTIALS", global = true)]
    pub credentials: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a bearer token
    Login(login::LoginArgs),

    /// Remove the stored token
    Logout(logout::LogoutArgs),

    /// Display the sign-in state
    Status(status::StatusArgs),

    /// Run a query or mutation and print the response
    Query(query::QueryArgs),

    /// Stream subscription responses as JSON lines
    Subscribe(subscribe::SubscribeArgs),
}
