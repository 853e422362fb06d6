//! Transport selection by operation kind.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use gqlink_core::error::Error;
use gqlink_core::{
    CredentialSource, Endpoint, HeaderSet, Operation, OperationKind, Response, ResponseStream,
    Result, Transport,
};

use crate::headers::{DEFAULT_PUBLIC_ROLE, HeaderComposer};
use crate::http::HttpTransport;
use crate::stream::{CredentialWatch, StreamController, StreamOptions};

/// Where an operation is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Http,
    Stream,
}

/// Configuration for a [`Link`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// The HTTP(S) GraphQL endpoint.
    pub endpoint: Endpoint,

    /// Headers sent with every operation.
    #[serde(default)]
    pub static_headers: HeaderSet,

    /// Role sent when no user is signed in.
    #[serde(default = "default_public_role")]
    pub public_role: String,

    /// Build the streaming transport. Disable where no persistent
    /// connection can live (server-side rendering, batch jobs).
    #[serde(default = "default_true")]
    pub supports_persistent_connection: bool,

    #[serde(default)]
    pub stream: StreamOptions,

    /// Reconnect the streaming transport on credential changes.
    #[serde(default = "default_true")]
    pub sync_credentials: bool,

    /// Per-request timeout for the HTTP transport, in milliseconds.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_public_role() -> String {
    DEFAULT_PUBLIC_ROLE.to_string()
}

fn default_true() -> bool {
    true
}

impl LinkConfig {
    /// Configuration with defaults for everything but the endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            static_headers: HeaderSet::new(),
            public_role: default_public_role(),
            supports_persistent_connection: true,
            stream: StreamOptions::default(),
            sync_credentials: true,
            request_timeout_ms: None,
        }
    }
}

/// A GraphQL link that sends subscriptions over the persistent transport
/// and everything else over HTTP, with credentials attached per operation.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use gqlink::{Link, MemoryCredentialSource};
/// use gqlink_core::Operation;
///
/// # async fn example() -> gqlink_core::Result<()> {
/// let source = Arc::new(MemoryCredentialSource::signed_in("abc"));
/// let link = Link::builder("https://api.example.com/graphql")
///     .header("x-app", "1")
///     .credentials(source)
///     .build()?;
///
/// let response = link.query(Operation::new("{ viewer { id } }")).await?;
/// println!("{:?}", response.data);
/// # Ok(())
/// # }
/// ```
pub struct Link {
    endpoint: Endpoint,
    http: HttpTransport,
    stream: Option<StreamController>,
    watch: Option<CredentialWatch>,
}

impl Link {
    /// Start building a link for `endpoint`.
    pub fn builder(endpoint: impl Into<String>) -> LinkBuilder {
        LinkBuilder::new(endpoint)
    }

    /// Create a link from a configuration.
    pub fn new(config: LinkConfig, source: Option<Arc<dyn CredentialSource>>) -> Result<Self> {
        let composer =
            HeaderComposer::new(config.static_headers, source.clone(), config.public_role)?;
        let http = HttpTransport::with_timeout(
            config.endpoint.clone(),
            composer.clone(),
            config.request_timeout_ms.map(Duration::from_millis),
        )?;

        let stream = config
            .supports_persistent_connection
            .then(|| StreamController::new(&config.endpoint, composer, config.stream));

        let watch = match (&stream, &source) {
            (Some(stream), Some(source)) if config.sync_credentials => {
                Some(stream.watch_credentials(source.as_ref()))
            }
            _ => None,
        };

        info!(
            endpoint = %config.endpoint,
            stream = ?stream.as_ref().map(|s| s.url()),
            "Link ready"
        );

        Ok(Self {
            endpoint: config.endpoint,
            http,
            stream,
            watch,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns the streaming transport, if one was built.
    pub fn stream_controller(&self) -> Option<&StreamController> {
        self.stream.as_ref()
    }

    /// Returns true if credential changes reconnect the streaming transport.
    pub fn syncs_credentials(&self) -> bool {
        self.watch.is_some()
    }

    /// Returns the HTTP transport.
    pub fn http(&self) -> &HttpTransport {
        &self.http
    }

    /// Decide where `operation` goes.
    pub fn route(&self, operation: &Operation) -> Result<Route> {
        let kind = operation.kind()?;
        let route = match (kind, &self.stream) {
            (OperationKind::Subscription, Some(_)) => Route::Stream,
            _ => Route::Http,
        };
        debug!(kind = %kind, route = ?route, "Routed operation");
        Ok(route)
    }

    /// Execute `operation` on the transport chosen by [`route`](Self::route).
    #[instrument(skip(self, operation), fields(op = ?operation.operation_name))]
    pub async fn execute(&self, operation: Operation) -> Result<ResponseStream> {
        match (self.route(&operation)?, &self.stream) {
            (Route::Stream, Some(stream)) => stream.subscribe(operation).await,
            _ => self.http.execute(operation).await,
        }
    }

    /// Execute `operation` and return its first response.
    pub async fn query(&self, operation: Operation) -> Result<Response> {
        let mut responses = self.execute(operation).await?;
        responses.next().await.unwrap_or(Err(Error::Closed))
    }

    /// Close the streaming transport, if any.
    pub fn close(&self) {
        if let Some(stream) = &self.stream {
            stream.close();
        }
    }
}

#[async_trait]
impl Transport for Link {
    fn name(&self) -> &'static str {
        "link"
    }

    async fn execute(&self, operation: Operation) -> Result<ResponseStream> {
        Link::execute(self, operation).await
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("endpoint", &self.endpoint)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Builder for [`Link`].
pub struct LinkBuilder {
    endpoint: String,
    static_headers: HeaderSet,
    public_role: String,
    supports_persistent_connection: bool,
    stream: StreamOptions,
    sync_credentials: bool,
    request_timeout: Option<Duration>,
    source: Option<Arc<dyn CredentialSource>>,
}

impl LinkBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            static_headers: HeaderSet::new(),
            public_role: default_public_role(),
            supports_persistent_connection: true,
            stream: StreamOptions::default(),
            sync_credentials: true,
            request_timeout: None,
            source: None,
        }
    }

    /// Add a header sent with every operation.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_headers.insert(name, value);
        self
    }

    /// Replace the static headers.
    pub fn headers(mut self, headers: HeaderSet) -> Self {
        self.static_headers = headers;
        self
    }

    pub fn public_role(mut self, role: impl Into<String>) -> Self {
        self.public_role = role.into();
        self
    }

    /// Attach credentials from `source` to every operation.
    pub fn credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn persistent_connection(mut self, enabled: bool) -> Self {
        self.supports_persistent_connection = enabled;
        self
    }

    pub fn stream_options(mut self, options: StreamOptions) -> Self {
        self.stream = options;
        self
    }

    pub fn sync_credentials(mut self, enabled: bool) -> Self {
        self.sync_credentials = enabled;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build the link.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error for a malformed endpoint, a
    /// non-HTTP scheme, or a reserved static header.
    pub fn build(self) -> Result<Link> {
        let config = LinkConfig {
            endpoint: Endpoint::new(&self.endpoint)?,
            static_headers: self.static_headers,
            public_role: self.public_role,
            supports_persistent_connection: self.supports_persistent_connection,
            stream: self.stream,
            sync_credentials: self.sync_credentials,
            request_timeout_ms: self.request_timeout.map(|t| t.as_millis() as u64),
        };
        Link::new(config, self.source)
    }
}
