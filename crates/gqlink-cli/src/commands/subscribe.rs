//! Subscribe command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use gqlink::{ConnectionEvent, StreamOptions, WsProtocol};

use super::EndpointArgs;
use crate::output;

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    #[command(flatten)]
    pub target: EndpointArgs,

    /// Speak the legacy subscriptions-transport-ws protocol
    #[arg(long)]
    pub legacy_protocol: bool,

    /// Do not reconnect when the stored credentials change
    #[arg(long)]
    pub no_sync: bool,
}

pub async fn run(args: SubscribeArgs, credentials: &Path) -> Result<()> {
    let protocol = if args.legacy_protocol {
        WsProtocol::GraphqlWs
    } else {
        WsProtocol::GraphqlTransportWs
    };

    let link = args
        .target
        .link(credentials)?
        .stream_options(StreamOptions::default().with_protocol(protocol))
        .sync_credentials(!args.no_sync)
        .build()
        .context("Invalid link configuration")?;
    let operation = args.target.operation()?;

    output::note("Connecting...");
    output::note("Press Ctrl+C to stop.");

    if let Some(controller) = link.stream_controller() {
        let mut events = controller.events();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => report(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed connection events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    let mut responses = link
        .execute(operation)
        .await
        .context("Failed to start subscription")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = responses.next() => match next {
                Some(Ok(response)) => output::json_line(&response)?,
                Some(Err(e)) => output::event("ERROR".red(), e),
                None => break,
            },
        }
    }

    link.close();
    Ok(())
}

fn report(event: &ConnectionEvent) {
    match event {
        ConnectionEvent::Connected { connection } => {
            output::event("CONNECTED".green(), format!("#{}", connection));
        }
        ConnectionEvent::Disconnected { reason } => {
            output::event("DISCONNECTED".yellow(), reason);
        }
        ConnectionEvent::Error { message } => output::event("ERROR".red(), message),
    }
}
