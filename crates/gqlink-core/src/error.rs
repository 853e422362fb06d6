//! Error types for gqlink.
//!
//! This module provides a unified error type with explicit variants for
//! configuration, connection, transport, protocol, credential and input
//! validation errors.

use std::fmt;
use thiserror::Error;

/// The unified error type for gqlink operations.
///
/// Configuration errors are fatal at construction time. Connection errors are
/// transient: the streaming transport retries them on its own. Credential
/// errors are swallowed by the components that query a credential source and
/// only surface when a caller queries the source directly.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid construction parameters (endpoint, headers).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The persistent transport could not be established.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Request/response transport errors (DNS, TLS, connection, timeout).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Protocol errors (HTTP status, malformed frames).
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A credential source failed to answer.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Input validation errors (documents, headers).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    /// The streaming transport has been closed.
    #[error("stream transport closed")]
    Closed,
}

/// Construction-time configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The endpoint could not be parsed as an absolute URL.
    #[error("invalid endpoint '{value}': {reason}")]
    Endpoint { value: String, reason: String },

    /// The endpoint scheme has no streaming counterpart.
    #[error("endpoint '{value}' must use http:// or https://")]
    UnsupportedScheme { value: String },

    /// A static header collides with a credential header.
    #[error("static header '{name}' is reserved for credentials")]
    ReservedHeader { name: String },
}

/// Persistent transport connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Network connection or WebSocket upgrade failed.
    #[error("connect to {url} failed: {message}")]
    Connect { url: String, message: String },

    /// The server rejected the connection parameters.
    #[error("connection rejected: {message}")]
    Rejected { message: String },

    /// The server did not acknowledge the connection in time.
    #[error("no connection_ack within {duration_ms}ms")]
    AckTimeout { duration_ms: u64 },

    /// The socket was lost after being established.
    #[error("connection lost: {message}")]
    Lost { message: String },
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out")]
    Timeout,

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

/// Protocol-level errors.
#[derive(Debug)]
pub struct ProtocolError {
    /// HTTP status code, if the error came from an HTTP response.
    pub status: Option<u16>,
    /// Description of what went wrong.
    pub message: Option<String>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}", status)?,
            None => write!(f, "malformed message")?,
        }
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Create a protocol error from an HTTP response status.
    pub fn http(status: u16, message: Option<String>) -> Self {
        Self {
            status: Some(status),
            message,
        }
    }

    /// Create a protocol error for a malformed or unexpected message.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: Some(message.into()),
        }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

/// Errors raised by a credential source.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The source is not available (torn down, not yet initialized).
    #[error("credential source unavailable: {message}")]
    Unavailable { message: String },

    /// The stored credentials could not be read.
    #[error("failed to read credentials: {message}")]
    Read { message: String },
}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// The GraphQL document could not be classified.
    #[error("invalid document: {reason}")]
    Document { reason: String },

    /// No operation definition matches the requested operation name.
    #[error("unknown operation '{name}'")]
    UnknownOperation { name: String },

    /// A header name or value cannot be sent.
    #[error("invalid header '{name}': {reason}")]
    Header { name: String, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_display_includes_status() {
        let err = ProtocolError::http(401, Some("unauthorized".to_string()));
        assert_eq!(err.to_string(), "HTTP 401: unauthorized");
        assert!(err.is_auth_error());
    }

    #[test]
    fn malformed_protocol_error_is_not_auth() {
        let err = ProtocolError::malformed("unexpected frame");
        assert_eq!(err.to_string(), "malformed message: unexpected frame");
        assert!(!err.is_auth_error());
    }

    #[test]
    fn config_error_converts_into_error() {
        let err: Error = ConfigError::UnsupportedScheme {
            value: "ftp://x".to_string(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("ftp://x"));
    }
}
