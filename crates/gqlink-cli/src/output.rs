//! Terminal output.
//!
//! Results go to stdout; progress and connection chatter go to stderr, so
//! `gqlink subscribe ... | jq` sees nothing but responses.

use std::fmt::Display;

use anyhow::Result;
use colored::{ColoredString, Colorize};
use serde::Serialize;

use gqlink_core::GraphqlError;

const LABEL_WIDTH: usize = 12;

/// Confirm a completed action.
pub fn done(msg: &str) {
    println!("{} {}", "ok".green().bold(), msg);
}

/// Print an aligned `label  value` line.
pub fn field(label: &str, value: impl Display) {
    let label = format!("{:<width$}", format!("{}:", label), width = LABEL_WIDTH);
    println!("{} {}", label.dimmed(), value);
}

/// Print a GraphQL error from a response, with its path when present.
pub fn graphql_error(error: &GraphqlError) {
    let path = error
        .path
        .as_ref()
        .map(|path| {
            path.iter()
                .map(|segment| match segment {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".")
        })
        .filter(|path| !path.is_empty());

    match path {
        Some(path) => eprintln!("{} {} (at {})", "graphql".red(), error.message, path),
        None => eprintln!("{} {}", "graphql".red(), error.message),
    }
}

/// Print a tagged status line to stderr.
pub fn event(tag: ColoredString, detail: impl Display) {
    eprintln!("{} {}", tag, detail);
}

/// Print a dimmed hint to stderr.
pub fn note(msg: &str) {
    eprintln!("{}", msg.dimmed());
}

/// One value per line, for streams.
pub fn json_line<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// A single indented value, for one-shot results.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
