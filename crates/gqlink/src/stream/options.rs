//! Streaming transport configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The GraphQL-over-WebSocket wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WsProtocol {
    /// `graphql-transport-ws`: `subscribe`/`next`/`complete`, ping/pong.
    #[default]
    GraphqlTransportWs,
    /// Legacy `graphql-ws` (subscriptions-transport-ws): `start`/`data`/`stop`,
    /// keep-alive frames.
    GraphqlWs,
}

impl WsProtocol {
    /// The `Sec-WebSocket-Protocol` value.
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::GraphqlTransportWs => "graphql-transport-ws",
            Self::GraphqlWs => "graphql-ws",
        }
    }
}

/// Backoff between failed connection attempts.
///
/// The delay before attempt `n` (counting consecutive failures from 1) is
/// `initial_delay * multiplier^(n-1)`, capped at `max_delay`.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use gqlink::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.delay_for(1), Duration::from_millis(500));
/// assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
/// assert_eq!(policy.delay_for(20), Duration::from_secs(30));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failure, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound for the delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Consecutive failures tolerated before giving up; `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Set the delay after the first failure.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the number of consecutive failures tolerated.
    pub fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Returns true if another attempt may follow `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }

    /// Returns the delay to wait after `failures` consecutive failures.
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(32) as i32;
        let delay = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

/// Options for the streaming transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Wire protocol spoken over the socket.
    #[serde(default)]
    pub protocol: WsProtocol,

    /// Close the old socket before opening a new one on reconnect.
    #[serde(default = "default_close_before_reconnect")]
    pub close_before_reconnect: bool,

    /// How long a handshake may take, through `connection_ack`, in milliseconds.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,

    /// How long to wait for the server to confirm a close, in milliseconds.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    /// Backoff between failed connection attempts.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_close_before_reconnect() -> bool {
    true
}

fn default_ack_timeout_ms() -> u64 {
    10_000
}

fn default_close_timeout_ms() -> u64 {
    2_000
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            protocol: WsProtocol::default(),
            close_before_reconnect: default_close_before_reconnect(),
            ack_timeout_ms: default_ack_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            retry: RetryPolicy::default(),
        }
    }
}

impl StreamOptions {
    pub fn with_protocol(mut self, protocol: WsProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_close_before_reconnect(mut self, enabled: bool) -> Self {
        self.close_before_reconnect = enabled;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub(crate) fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
