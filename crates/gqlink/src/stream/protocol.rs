//! GraphQL-over-WebSocket message codec.

use serde::Deserialize;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use gqlink_core::error::ProtocolError;
use gqlink_core::{GraphqlError, Operation, Response, Result};

use super::options::WsProtocol;

/// A decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ServerMessage {
    ConnectionAck,
    /// The server refused `connection_init` (legacy protocol only).
    ConnectionError(String),
    Next {
        id: String,
        payload: Response,
    },
    Error {
        id: String,
        errors: Vec<GraphqlError>,
    },
    Complete {
        id: String,
    },
    Ping(Option<Value>),
    Pong,
    KeepAlive,
    /// A message type this codec does not know.
    Unknown(String),
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

fn text(value: Value) -> Message {
    Message::text(value.to_string())
}

/// `connection_init` carrying the connection parameters.
pub(crate) fn connection_init(params: Value) -> Message {
    text(json!({ "type": "connection_init", "payload": params }))
}

/// Start an operation under `id`.
pub(crate) fn subscribe(protocol: WsProtocol, id: &str, operation: &Operation) -> Message {
    let kind = match protocol {
        WsProtocol::GraphqlTransportWs => "subscribe",
        WsProtocol::GraphqlWs => "start",
    };
    text(json!({ "type": kind, "id": id, "payload": operation }))
}

/// Stop the operation running under `id`.
pub(crate) fn stop(protocol: WsProtocol, id: &str) -> Message {
    let kind = match protocol {
        WsProtocol::GraphqlTransportWs => "complete",
        WsProtocol::GraphqlWs => "stop",
    };
    text(json!({ "type": kind, "id": id }))
}

/// Answer a protocol-level ping.
pub(crate) fn pong(payload: Option<Value>) -> Message {
    match payload {
        Some(payload) => text(json!({ "type": "pong", "payload": payload })),
        None => text(json!({ "type": "pong" })),
    }
}

/// The goodbye message sent before closing, if the protocol has one.
pub(crate) fn terminate(protocol: WsProtocol) -> Option<Message> {
    match protocol {
        WsProtocol::GraphqlTransportWs => None,
        WsProtocol::GraphqlWs => Some(text(json!({ "type": "connection_terminate" }))),
    }
}

/// Decode one text frame.
pub(crate) fn decode(protocol: WsProtocol, frame: &str) -> Result<ServerMessage> {
    let raw: RawMessage = serde_json::from_str(frame)
        .map_err(|e| ProtocolError::malformed(format!("invalid frame: {}", e)))?;

    let message = match (protocol, raw.kind.as_str()) {
        (_, "connection_ack") => ServerMessage::ConnectionAck,
        (WsProtocol::GraphqlWs, "connection_error") => {
            ServerMessage::ConnectionError(error_message(raw.payload.as_ref()))
        }
        (WsProtocol::GraphqlWs, "ka") => ServerMessage::KeepAlive,
        (WsProtocol::GraphqlTransportWs, "ping") => ServerMessage::Ping(raw.payload),
        (WsProtocol::GraphqlTransportWs, "pong") => ServerMessage::Pong,
        (WsProtocol::GraphqlTransportWs, "next") | (WsProtocol::GraphqlWs, "data") => {
            let id = require_id(raw.id, &raw.kind)?;
            let payload = serde_json::from_value(raw.payload.unwrap_or(Value::Null))
                .map_err(|e| ProtocolError::malformed(format!("invalid payload: {}", e)))?;
            ServerMessage::Next { id, payload }
        }
        (_, "error") => ServerMessage::Error {
            id: require_id(raw.id, &raw.kind)?,
            errors: graphql_errors(raw.payload),
        },
        (_, "complete") => ServerMessage::Complete {
            id: require_id(raw.id, &raw.kind)?,
        },
        (_, other) => ServerMessage::Unknown(other.to_string()),
    };

    Ok(message)
}

fn require_id(id: Option<String>, kind: &str) -> Result<String> {
    id.ok_or_else(|| ProtocolError::malformed(format!("'{}' message without id", kind)).into())
}

/// Errors arrive as an array (current protocol) or a single object (legacy).
fn graphql_errors(payload: Option<Value>) -> Vec<GraphqlError> {
    match payload {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                let fallback = error_message(Some(&item));
                serde_json::from_value(item).unwrap_or_else(|_| plain_error(fallback))
            })
            .collect(),
        Some(other) => {
            let fallback = error_message(Some(&other));
            vec![serde_json::from_value(other).unwrap_or_else(|_| plain_error(fallback))]
        }
        None => vec![plain_error("subscription failed".to_string())],
    }
}

fn plain_error(message: String) -> GraphqlError {
    GraphqlError {
        message,
        locations: Vec::new(),
        path: None,
        extensions: None,
    }
}

fn error_message(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::String(message)) => message.clone(),
        Some(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Some(other) => other.to_string(),
        None => "connection refused".to_string(),
    }
}
