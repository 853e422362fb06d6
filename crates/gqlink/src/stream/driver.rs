//! The socket task behind a [`StreamController`](super::StreamController).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use gqlink_core::error::{ConnectionError, Error};
use gqlink_core::{Operation, Response, Result};

use super::protocol::{self, ServerMessage};
use super::{Command, ConnectionEvent, ConnectionState, Core, WsProtocol};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An operation that is re-sent on every new socket until it ends.
struct Active {
    operation: Operation,
    sink: mpsc::Sender<Result<Response>>,
}

/// Why a connected socket stopped being used.
enum Exit {
    Reconnect,
    Lost(String),
    Close,
}

/// What to do after a failed attempt's backoff.
enum Flow {
    Retry,
    Stop,
}

/// Drive one connection cycle until it is closed or gives up.
///
/// The first handshake result is reported on `ready`.
pub(super) async fn run(
    core: Arc<Core>,
    generation: u64,
    mut commands: mpsc::UnboundedReceiver<Command>,
    ready: oneshot::Sender<Result<()>>,
) {
    let mut ready = Some(ready);
    let mut active: HashMap<String, Active> = HashMap::new();
    let mut failures: u32 = 0;

    loop {
        let mut socket = match handshake(&core).await {
            Ok(socket) => socket,
            Err(e) => {
                failures += 1;
                warn!(error = %e, failures, "Connection attempt failed");
                core.emit(ConnectionEvent::Error {
                    message: e.to_string(),
                });

                let moved = core.transition(generation, |state| match state {
                    ConnectionState::Connecting | ConnectionState::Reconnecting => {
                        Some(ConnectionState::Reconnecting)
                    }
                    _ => None,
                });
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(e));
                }
                if !moved {
                    break;
                }

                if !core.options.retry.allows(failures) {
                    error!(failures, "Giving up on the stream transport");
                    core.transition(generation, |_| Some(ConnectionState::Closed));
                    core.emit(ConnectionEvent::Disconnected {
                        reason: "retry attempts exhausted".to_string(),
                    });
                    break;
                }

                let delay = core.options.retry.delay_for(failures);
                debug!(delay_ms = delay.as_millis() as u64, "Backing off");
                match backoff(delay, &mut commands, &mut active).await {
                    Flow::Retry => continue,
                    Flow::Stop => break,
                }
            }
        };

        failures = 0;
        let connected = core.transition(generation, |state| match state {
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                Some(ConnectionState::Connected)
            }
            _ => None,
        });
        if !connected {
            debug!("Cycle closed during handshake");
            shutdown(&mut socket, &core).await;
            break;
        }

        let connection = core.record_connection();
        info!(connection, "Stream transport connected");
        core.emit(ConnectionEvent::Connected { connection });
        if let Some(ready) = ready.take() {
            let _ = ready.send(Ok(()));
        }

        match pump(&core, &mut socket, &mut commands, &mut active).await {
            Exit::Reconnect => {
                if core.options.close_before_reconnect {
                    shutdown(&mut socket, &core).await;
                }
                drop(socket);
            }
            Exit::Lost(reason) => {
                warn!(reason = %reason, "Stream transport lost");
                core.emit(ConnectionEvent::Disconnected { reason });
                let moved = core.transition(generation, |state| match state {
                    ConnectionState::Connected | ConnectionState::Reconnecting => {
                        Some(ConnectionState::Reconnecting)
                    }
                    _ => None,
                });
                if !moved {
                    break;
                }
            }
            Exit::Close => {
                shutdown(&mut socket, &core).await;
                core.emit(ConnectionEvent::Disconnected {
                    reason: "closed".to_string(),
                });
                break;
            }
        }
    }

    // Dropping the sinks ends every subscription stream.
    if !active.is_empty() {
        debug!(count = active.len(), "Ending open subscriptions");
    }
    core.transition(generation, |_| Some(ConnectionState::Closed));
}

/// Open the socket and complete `connection_init`/`connection_ack` within
/// the ack timeout.
async fn handshake(core: &Core) -> Result<Socket> {
    let ack_timeout = core.options.ack_timeout();
    match tokio::time::timeout(ack_timeout, open(core)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::AckTimeout {
            duration_ms: ack_timeout.as_millis() as u64,
        }
        .into()),
    }
}

/// Connection parameters are composed here, once per attempt.
async fn open(core: &Core) -> Result<Socket> {
    let protocol = core.options.protocol;
    let connect_error = |message: String| ConnectionError::Connect {
        url: core.url.clone(),
        message,
    };

    let mut request = core
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| connect_error(e.to_string()))?;
    request.headers_mut().insert(
        SEC_WEBSOCKET_PROTOCOL,
        HeaderValue::from_static(protocol.subprotocol()),
    );

    debug!(url = %core.url, subprotocol = protocol.subprotocol(), "Opening socket");
    let (mut socket, _) = connect_async(request)
        .await
        .map_err(|e| connect_error(e.to_string()))?;

    let params = core.composer.connection_params();
    socket
        .send(protocol::connection_init(params))
        .await
        .map_err(|e| connect_error(e.to_string()))?;

    await_ack(&mut socket, protocol).await?;
    Ok(socket)
}

async fn await_ack(socket: &mut Socket, protocol: WsProtocol) -> Result<()> {
    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Text(text)) => match protocol::decode(protocol, text.as_str())? {
                ServerMessage::ConnectionAck => return Ok(()),
                ServerMessage::ConnectionError(message) => {
                    return Err(ConnectionError::Rejected { message }.into());
                }
                ServerMessage::Ping(payload) => {
                    send(socket, protocol::pong(payload)).await?;
                }
                other => trace!(message = ?other, "Ignoring message before ack"),
            },
            Ok(Message::Ping(data)) => {
                send(socket, Message::Pong(data)).await?;
            }
            Ok(Message::Close(frame)) => {
                let message = frame
                    .map(|f| f.reason.as_str().to_string())
                    .filter(|reason| !reason.is_empty())
                    .unwrap_or_else(|| "closed before connection_ack".to_string());
                return Err(ConnectionError::Rejected { message }.into());
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ConnectionError::Lost {
                    message: e.to_string(),
                }
                .into());
            }
        }
    }

    Err(ConnectionError::Lost {
        message: "closed before connection_ack".to_string(),
    }
    .into())
}

async fn send(socket: &mut Socket, message: Message) -> Result<()> {
    socket.send(message).await.map_err(|e| {
        Error::from(ConnectionError::Lost {
            message: e.to_string(),
        })
    })
}

/// Serve commands and server messages on a connected socket.
async fn pump(
    core: &Core,
    socket: &mut Socket,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    active: &mut HashMap<String, Active>,
) -> Exit {
    let protocol = core.options.protocol;

    if !active.is_empty() {
        debug!(count = active.len(), "Resubscribing");
    }
    for (id, entry) in active.iter() {
        if let Err(e) = send(socket, protocol::subscribe(protocol, id, &entry.operation)).await {
            return Exit::Lost(e.to_string());
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Subscribe { id, operation, sink }) => {
                    let frame = protocol::subscribe(protocol, &id, &operation);
                    active.insert(id, Active { operation, sink });
                    if let Err(e) = send(socket, frame).await {
                        return Exit::Lost(e.to_string());
                    }
                }
                Some(Command::Unsubscribe { id }) => {
                    if active.remove(&id).is_some() {
                        trace!(id = %id, "Stopping operation");
                        if let Err(e) = send(socket, protocol::stop(protocol, &id)).await {
                            return Exit::Lost(e.to_string());
                        }
                    }
                }
                Some(Command::Reconnect) => {
                    // Stale if a loss already replaced the socket.
                    if *core.state.borrow() == ConnectionState::Reconnecting {
                        return Exit::Reconnect;
                    }
                    trace!("Ignoring stale reconnect");
                }
                Some(Command::Close) | None => return Exit::Close,
            },
            message = socket.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(exit) = dispatch(socket, protocol, text.as_str(), active).await {
                        return exit;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    trace!("Received ping");
                    if let Err(e) = send(socket, Message::Pong(data)).await {
                        return Exit::Lost(e.to_string());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Socket closed by server");
                    return Exit::Lost("closed by server".to_string());
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("Ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "WebSocket error");
                    return Exit::Lost(e.to_string());
                }
                None => return Exit::Lost("socket ended".to_string()),
            },
        }
    }
}

/// Route one server message to its subscription.
async fn dispatch(
    socket: &mut Socket,
    protocol: WsProtocol,
    text: &str,
    active: &mut HashMap<String, Active>,
) -> Option<Exit> {
    let message = match protocol::decode(protocol, text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Dropping undecodable message");
            return None;
        }
    };

    match message {
        ServerMessage::Next { id, payload } => {
            let Some(entry) = active.get(&id) else {
                trace!(id = %id, "Payload for unknown operation");
                return None;
            };
            if entry.sink.send(Ok(payload)).await.is_err() {
                active.remove(&id);
                if let Err(e) = send(socket, protocol::stop(protocol, &id)).await {
                    return Some(Exit::Lost(e.to_string()));
                }
            }
        }
        ServerMessage::Error { id, errors } => {
            if let Some(entry) = active.remove(&id) {
                debug!(id = %id, count = errors.len(), "Operation failed");
                let _ = entry.sink.send(Ok(Response::from_errors(errors))).await;
            }
        }
        ServerMessage::Complete { id } => {
            if active.remove(&id).is_some() {
                debug!(id = %id, "Operation completed by server");
            }
        }
        ServerMessage::Ping(payload) => {
            if let Err(e) = send(socket, protocol::pong(payload)).await {
                return Some(Exit::Lost(e.to_string()));
            }
        }
        ServerMessage::ConnectionError(message) => {
            return Some(Exit::Lost(message));
        }
        ServerMessage::KeepAlive | ServerMessage::Pong | ServerMessage::ConnectionAck => {
            trace!("Keep-alive");
        }
        ServerMessage::Unknown(kind) => {
            debug!(kind = %kind, "Ignoring unknown message type");
        }
    }

    None
}

/// Wait out a backoff delay while still accepting commands.
async fn backoff(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    active: &mut HashMap<String, Active>,
) -> Flow {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return Flow::Retry,
            command = commands.recv() => match command {
                Some(Command::Subscribe { id, operation, sink }) => {
                    active.insert(id, Active { operation, sink });
                }
                Some(Command::Unsubscribe { id }) => {
                    active.remove(&id);
                }
                Some(Command::Reconnect) => return Flow::Retry,
                Some(Command::Close) | None => return Flow::Stop,
            },
        }
    }
}

/// Close the socket gracefully, bounded by the close timeout.
async fn shutdown(socket: &mut Socket, core: &Core) {
    let protocol = core.options.protocol;
    let closing = async {
        if let Some(goodbye) = protocol::terminate(protocol) {
            let _ = socket.send(goodbye).await;
        }
        if socket.close(None).await.is_err() {
            return;
        }
        while let Some(Ok(_)) = socket.next().await {}
    };

    if tokio::time::timeout(core.options.close_timeout(), closing)
        .await
        .is_err()
    {
        debug!("Server did not confirm close in time");
    }
}
