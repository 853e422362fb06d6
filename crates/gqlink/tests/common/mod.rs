//! Shared helpers for gqlink integration tests.
//!
//! [`MockGraphqlServer`] speaks both GraphQL WebSocket protocols well enough
//! to exercise the streaming transport: it acks every `connection_init`
//! (unless told to reject), answers each started operation with a single
//! payload carrying the connection number, and records what it saw.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use gqlink_core::Endpoint;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};

/// What the mock server observed.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    /// Completed WebSocket upgrades.
    pub connections: usize,
    /// Requested subprotocol per connection.
    pub subprotocols: Vec<String>,
    /// `connection_init` payloads, in arrival order.
    pub init_payloads: Vec<Value>,
    /// Started operation payloads, in arrival order.
    pub operations: Vec<Value>,
    /// Ids of operations the client stopped.
    pub stops: Vec<String>,
    /// Close frames sent by the client.
    pub client_closes: usize,
}

pub struct MockGraphqlServer {
    addr: SocketAddr,
    recorded: Arc<Mutex<Recorded>>,
    rejections: Arc<Mutex<usize>>,
    kill: broadcast::Sender<()>,
}

impl MockGraphqlServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let rejections = Arc::new(Mutex::new(0));
        let (kill, _) = broadcast::channel(4);

        let server = Self {
            addr,
            recorded: recorded.clone(),
            rejections: rejections.clone(),
            kill: kill.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    recorded.clone(),
                    rejections.clone(),
                    kill.subscribe(),
                ));
            }
        });

        server
    }

    /// The HTTP endpoint whose streaming counterpart is this server.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(format!("http://{}/graphql", self.addr)).unwrap()
    }

    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.recorded.lock().unwrap().connections
    }

    /// Close the next `count` handshakes instead of acknowledging them.
    pub fn reject_next(&self, count: usize) {
        *self.rejections.lock().unwrap() = count;
    }

    /// Drop every open socket without a close frame.
    pub fn disconnect_all(&self) {
        let _ = self.kill.send(());
    }
}

type ServerSocket = WebSocketStream<TcpStream>;

async fn serve(
    stream: TcpStream,
    recorded: Arc<Mutex<Recorded>>,
    rejections: Arc<Mutex<usize>>,
    mut kill: broadcast::Receiver<()>,
) {
    let requested = Arc::new(Mutex::new(None::<String>));
    let slot = requested.clone();
    let callback =
        move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            if let Some(protocol) = request.headers().get("sec-websocket-protocol") {
                *slot.lock().unwrap() = protocol.to_str().ok().map(str::to_string);
                response
                    .headers_mut()
                    .insert("sec-websocket-protocol", protocol.clone());
            }
            Ok(response)
        };

    let Ok(mut socket) = accept_hdr_async(stream, callback).await else {
        return;
    };

    let subprotocol = requested.lock().unwrap().clone().unwrap_or_default();
    let legacy = subprotocol == "graphql-ws";
    let connection = {
        let mut recorded = recorded.lock().unwrap();
        recorded.connections += 1;
        recorded.subprotocols.push(subprotocol);
        recorded.connections
    };

    loop {
        tokio::select! {
            _ = kill.recv() => return,
            message = socket.next() => {
                let Some(Ok(message)) = message else {
                    return;
                };
                match message {
                    Message::Text(text) => {
                        let frame: Value = serde_json::from_str(text.as_str()).unwrap();
                        match frame["type"].as_str().unwrap_or_default() {
                            "connection_init" => {
                                recorded
                                    .lock()
                                    .unwrap()
                                    .init_payloads
                                    .push(frame["payload"].clone());
                                let reject = {
                                    let mut remaining = rejections.lock().unwrap();
                                    let reject = *remaining > 0;
                                    *remaining = remaining.saturating_sub(1);
                                    reject
                                };
                                if reject {
                                    let _ = socket.close(None).await;
                                    return;
                                }
                                send(&mut socket, json!({"type": "connection_ack"})).await;
                            }
                            "subscribe" | "start" => {
                                recorded.lock().unwrap().operations.push(frame["payload"].clone());
                                let kind = if legacy { "data" } else { "next" };
                                send(
                                    &mut socket,
                                    json!({
                                        "type": kind,
                                        "id": frame["id"],
                                        "payload": {"data": {"connection": connection}}
                                    }),
                                )
                                .await;
                            }
                            "complete" | "stop" => {
                                let id = frame["id"].as_str().unwrap_or_default().to_string();
                                recorded.lock().unwrap().stops.push(id);
                            }
                            "ping" => send(&mut socket, json!({"type": "pong"})).await,
                            _ => {}
                        }
                    }
                    Message::Close(_) => {
                        recorded.lock().unwrap().client_closes += 1;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send(socket: &mut ServerSocket, frame: Value) {
    let _ = socket.send(Message::text(frame.to_string())).await;
}

/// A listener that accepts TCP connections and never answers.
pub async fn black_hole() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    Endpoint::new(format!("http://{}/graphql", addr)).unwrap()
}

/// An endpoint nothing listens on.
pub async fn unreachable() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Endpoint::new(format!("http://{}/graphql", addr)).unwrap()
}

/// Poll `condition` until it holds, failing after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met in time");
}
