//! Streaming transport over a persistent WebSocket.
//!
//! A [`StreamController`] owns at most one socket at a time. The socket is
//! driven by a background task; the controller talks to it over a command
//! channel and publishes its [`ConnectionState`] through a watch channel.
//!
//! ```text
//! idle -> connecting -> connected <-> reconnecting
//!   any state --close()--> closed --connect()--> connecting
//! ```
//!
//! Credential changes must not reconnect a socket that is mid-handshake:
//! [`StreamController::reconnect`] only acts from `connected` and reports
//! every other state as an [`AuthRaceWarning`]. A handshake always reads
//! the credential source when it starts, so nothing is lost by skipping.

mod driver;
pub mod options;
pub(crate) mod protocol;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use gqlink_core::error::Error;
use gqlink_core::{
    CredentialSource, Endpoint, Operation, Response, ResponseStream, Result, Subscription,
    Transport,
};

use crate::headers::HeaderComposer;

pub use options::{RetryPolicy, StreamOptions, WsProtocol};

/// Responses buffered per subscription before the socket task waits.
const SUBSCRIPTION_BUFFER: usize = 100;

/// Connection events buffered for slow observers.
const EVENT_BUFFER: usize = 64;

/// Lifecycle state of the streaming transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// First handshake in progress.
    Connecting,
    /// Handshake acknowledged; operations flow.
    Connected,
    /// Replacing the socket after a credential change or a loss.
    Reconnecting,
    /// Closed by the caller or out of retries.
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reconnect request arrived while the transport was not connected.
///
/// Non-fatal: it is logged and returned, never raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRaceWarning {
    /// The state the request found.
    pub state: ConnectionState,
}

impl fmt::Display for AuthRaceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "credentials changed while {}; the next handshake will use them",
            self.state
        )
    }
}

/// Result of [`StreamController::reconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The socket is being replaced.
    Started,
    /// Nothing was done.
    Ignored(AuthRaceWarning),
}

impl ReconnectOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started)
    }
}

/// Observable connection events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A handshake was acknowledged. `connection` counts every
    /// acknowledged handshake since the controller was created.
    Connected { connection: u64 },
    /// An established socket went away.
    Disconnected { reason: String },
    /// A connection attempt failed.
    Error { message: String },
}

pub(crate) enum Command {
    Subscribe {
        id: String,
        operation: Operation,
        sink: mpsc::Sender<Result<Response>>,
    },
    Unsubscribe {
        id: String,
    },
    Reconnect,
    Close,
}

/// State shared with the socket task.
pub(crate) struct Core {
    url: String,
    composer: HeaderComposer,
    options: StreamOptions,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    connections: AtomicU64,
    /// Cycle generation; every state write happens under this lock.
    generation: Mutex<u64>,
}

impl Core {
    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        self.generation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `step` to the current state if `generation` is still current.
    ///
    /// Returns false when the cycle was superseded or `step` refused.
    pub(crate) fn transition(
        &self,
        generation: u64,
        step: impl FnOnce(ConnectionState) -> Option<ConnectionState>,
    ) -> bool {
        let current = self.lock_generation();
        if *current != generation {
            return false;
        }
        apply(&self.state, step)
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn record_connection(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn apply(
    state: &watch::Sender<ConnectionState>,
    step: impl FnOnce(ConnectionState) -> Option<ConnectionState>,
) -> bool {
    let mut accepted = false;
    state.send_if_modified(|current| match step(*current) {
        Some(next) => {
            accepted = true;
            let changed = *current != next;
            *current = next;
            changed
        }
        None => false,
    });
    accepted
}

struct Inner {
    core: Arc<Core>,
    /// Command channel of the running cycle.
    commands: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl Inner {
    fn lock_commands(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Command>>> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Controller for the persistent streaming transport.
///
/// Cheap to clone; clones control the same socket. The socket task stops
/// once every clone and every open subscription stream is dropped.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use futures_util::StreamExt;
/// use gqlink::{HeaderComposer, MemoryCredentialSource, StreamController, StreamOptions};
/// use gqlink_core::{Endpoint, HeaderSet, Operation};
///
/// # async fn example() -> gqlink_core::Result<()> {
/// let source = Arc::new(MemoryCredentialSource::new());
/// let composer = HeaderComposer::new(HeaderSet::new(), Some(source.clone()), "public")?;
/// let endpoint = Endpoint::new("https://api.example.com/graphql")?;
///
/// let controller = StreamController::new(&endpoint, composer, StreamOptions::default());
/// let _watch = controller.watch_credentials(source.as_ref());
///
/// let mut ticks = controller.subscribe(Operation::new("subscription { ticks }")).await?;
/// while let Some(response) = ticks.next().await {
///     println!("{:?}", response?.data);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct StreamController {
    inner: Arc<Inner>,
}

impl StreamController {
    /// Create an idle controller for the streaming counterpart of `endpoint`.
    pub fn new(endpoint: &Endpoint, composer: HeaderComposer, options: StreamOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let core = Core {
            url: endpoint.stream_url(),
            composer,
            options,
            state,
            events,
            connections: AtomicU64::new(0),
            generation: Mutex::new(0),
        };

        Self {
            inner: Arc::new(Inner {
                core: Arc::new(core),
                commands: Mutex::new(None),
            }),
        }
    }

    /// Returns the WebSocket URL.
    pub fn url(&self) -> &str {
        &self.inner.core.url
    }

    pub fn options(&self) -> &StreamOptions {
        &self.inner.core.options
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.core.state.borrow()
    }

    /// Watch state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.core.state.subscribe()
    }

    /// Receive connection events from now on.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.core.events.subscribe()
    }

    /// Number of acknowledged handshakes so far.
    pub fn connection_count(&self) -> u64 {
        self.inner.core.connections.load(Ordering::SeqCst)
    }

    /// Start connecting if idle or closed, and wait for the first handshake.
    ///
    /// Returns immediately when a connection cycle is already running. On
    /// failure the error is returned and the controller keeps retrying in
    /// the background (state `reconnecting`) under its [`RetryPolicy`].
    #[instrument(skip(self), fields(url = %self.url()))]
    pub async fn connect(&self) -> Result<()> {
        let ready = {
            let mut commands = self.inner.lock_commands();
            self.start_cycle(&mut commands)
        };

        match ready {
            Some(ready) => ready.await.unwrap_or(Err(Error::Closed)),
            None => {
                debug!(state = %self.state(), "Connection cycle already running");
                Ok(())
            }
        }
    }

    /// Wait until the transport is connected.
    ///
    /// Fails with [`Error::Closed`] if the transport closes first.
    pub async fn connected(&self) -> Result<()> {
        let mut changes = self.state_changes();
        let state = changes
            .wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed))
            .await
            .map_err(|_| Error::Closed)?;

        match *state {
            ConnectionState::Connected => Ok(()),
            _ => Err(Error::Closed),
        }
    }

    /// Replace the socket so the next handshake carries fresh credentials.
    ///
    /// Acts only from `connected`; the state flips to `reconnecting` before
    /// this returns, so concurrent requests coalesce into one new socket.
    /// From any other state nothing happens and an [`AuthRaceWarning`] is
    /// returned.
    pub fn reconnect(&self) -> ReconnectOutcome {
        let commands = self.inner.lock_commands();

        let mut found = ConnectionState::Idle;
        let started = {
            let _generation = self.inner.core.lock_generation();
            apply(&self.inner.core.state, |state| {
                found = state;
                (state == ConnectionState::Connected).then_some(ConnectionState::Reconnecting)
            })
        };

        if !started {
            let warning = AuthRaceWarning { state: found };
            debug!(%warning, "Reconnect skipped");
            return ReconnectOutcome::Ignored(warning);
        }

        if let Some(commands) = commands.as_ref() {
            let _ = commands.send(Command::Reconnect);
        }
        info!("Reconnecting with fresh credentials");
        ReconnectOutcome::Started
    }

    /// Close the transport from any state.
    ///
    /// Every open subscription stream ends. A later [`connect`](Self::connect)
    /// or [`subscribe`](Self::subscribe) starts a fresh cycle.
    pub fn close(&self) {
        let mut commands = self.inner.lock_commands();
        {
            let mut generation = self.inner.core.lock_generation();
            *generation += 1;
            self.inner.core.state.send_replace(ConnectionState::Closed);
        }
        if let Some(commands) = commands.take() {
            let _ = commands.send(Command::Close);
        }
        info!("Stream transport closed");
    }

    /// Run `operation` over the socket, connecting lazily.
    ///
    /// The stream yields one item per server payload and ends when the
    /// server completes the operation or the transport closes. Dropping it
    /// stops the operation on the server. Active operations are re-sent
    /// after every reconnect.
    #[instrument(skip(self, operation), fields(op = ?operation.operation_name))]
    pub async fn subscribe(&self, operation: Operation) -> Result<ResponseStream> {
        let commands = {
            let mut guard = self.inner.lock_commands();
            self.start_cycle(&mut guard);
            guard.clone().ok_or(Error::Closed)?
        };

        let id = Uuid::new_v4().to_string();
        let (sink, mut responses) = mpsc::channel(SUBSCRIPTION_BUFFER);
        debug!(id = %id, "Subscribing");

        commands
            .send(Command::Subscribe {
                id: id.clone(),
                operation,
                sink,
            })
            .map_err(|_| Error::Closed)?;

        let guard = StopOnDrop { id, commands };
        let stream = async_stream::stream! {
            let _guard = guard;
            while let Some(item) = responses.recv().await {
                yield item;
            }
        };

        Ok(ResponseStream::new(stream))
    }

    /// Reconnect whenever `source` reports a sign-in or token change.
    ///
    /// Dropping the returned handle stops watching. The handle does not keep
    /// the controller alive.
    pub fn watch_credentials(&self, source: &dyn CredentialSource) -> CredentialWatch {
        let on_auth = Arc::downgrade(&self.inner);
        let auth = source.on_auth_state_changed(Box::new(move |signed_in| {
            debug!(signed_in, "Sign-in state changed");
            reconnect_weak(&on_auth);
        }));

        let on_token = Arc::downgrade(&self.inner);
        let token = source.on_token_changed(Box::new(move || {
            debug!("Token changed");
            reconnect_weak(&on_token);
        }));

        CredentialWatch {
            _auth: auth,
            _token: token,
        }
    }

    /// Spawn a socket task if no cycle is running.
    fn start_cycle(
        &self,
        commands: &mut Option<mpsc::UnboundedSender<Command>>,
    ) -> Option<oneshot::Receiver<Result<()>>> {
        let core = &self.inner.core;
        let generation = {
            let mut generation = core.lock_generation();
            let started = apply(&core.state, |state| {
                matches!(state, ConnectionState::Idle | ConnectionState::Closed)
                    .then_some(ConnectionState::Connecting)
            });
            if !started {
                return None;
            }
            *generation += 1;
            *generation
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        *commands = Some(tx);

        info!(url = %core.url, generation, "Starting connection cycle");
        tokio::spawn(driver::run(core.clone(), generation, rx, ready_tx));
        Some(ready_rx)
    }
}

fn reconnect_weak(inner: &Weak<Inner>) {
    if let Some(inner) = inner.upgrade() {
        StreamController { inner }.reconnect();
    }
}

impl fmt::Debug for StreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamController")
            .field("url", &self.url())
            .field("state", &self.state())
            .finish()
    }
}

#[async_trait]
impl Transport for StreamController {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn execute(&self, operation: Operation) -> Result<ResponseStream> {
        self.subscribe(operation).await
    }
}

/// Keeps a controller reconnecting on credential changes.
#[must_use = "credential changes are ignored once the watch is dropped"]
pub struct CredentialWatch {
    _auth: Subscription,
    _token: Subscription,
}

impl fmt::Debug for CredentialWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialWatch").finish_non_exhaustive()
    }
}

struct StopOnDrop {
    id: String,
    commands: mpsc::UnboundedSender<Command>,
}

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe {
            id: std::mem::take(&mut self.id),
        });
    }
}
