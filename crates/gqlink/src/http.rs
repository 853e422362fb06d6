//! Request/response transport over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::{debug, instrument, trace};

use gqlink_core::error::{Error, InvalidInputError, ProtocolError, TransportError};
use gqlink_core::{Endpoint, HeaderSet, Operation, Response, ResponseStream, Result, Transport};

use crate::headers::HeaderComposer;

/// HTTP transport for queries and mutations.
///
/// Every request passes through the [`HeaderComposer`] first, so credentials
/// are attached per call.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Endpoint,
    composer: HeaderComposer,
}

/// Body of a non-success response, when the server sent one.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl HttpTransport {
    /// Create a transport bound to `endpoint`.
    pub fn new(endpoint: Endpoint, composer: HeaderComposer) -> Result<Self> {
        Self::with_timeout(endpoint, composer, None)
    }

    /// Create a transport with a per-request timeout.
    pub fn with_timeout(
        endpoint: Endpoint,
        composer: HeaderComposer,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("gqlink/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(map_reqwest)?;

        Ok(Self {
            client,
            endpoint,
            composer,
        })
    }

    /// Returns the endpoint this transport posts to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Send one operation and return its response.
    #[instrument(
        skip(self, operation),
        fields(endpoint = %self.endpoint, op = ?operation.operation_name)
    )]
    pub async fn send(&self, operation: &Operation) -> Result<Response> {
        let headers = to_header_map(&self.composer.compose())?;
        debug!("GraphQL request");
        trace!(query = %operation.query, "request document");

        let response = self
            .client
            .post(self.endpoint.as_str())
            .headers(headers)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(operation)
            .send()
            .await
            .map_err(map_reqwest)?;

        self.handle_response(response).await
    }

    /// Handle a response, parsing the body or error.
    async fn handle_response(&self, response: reqwest::Response) -> Result<Response> {
        let status = response.status();
        trace!(status = %status, "GraphQL response");

        if status.is_success() {
            return response.json::<Response>().await.map_err(map_reqwest);
        }

        let code = status.as_u16();
        let body = response.bytes().await.unwrap_or_default();

        // GraphQL-over-HTTP servers may answer 4xx with a regular response body.
        if let Ok(graphql) = serde_json::from_slice::<Response>(&body)
            && graphql.has_errors()
        {
            debug!(status = code, "GraphQL errors with non-success status");
            return Err(ProtocolError::http(
                code,
                Some(
                    graphql
                        .errors
                        .iter()
                        .map(|e| e.message.as_str())
                        .collect::<Vec<_>>()
                        .join("; "),
                ),
            )
            .into());
        }

        let message = serde_json::from_slice::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message.or(b.error));
        Err(ProtocolError::http(code, message).into())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn execute(&self, operation: Operation) -> Result<ResponseStream> {
        let response = self.send(&operation).await;
        Ok(ResponseStream::once(response))
    }
}

/// Convert a composed header set into request headers.
pub(crate) fn to_header_map(headers: &HeaderSet) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(headers.len() + 1);
    for (name, value) in headers.iter() {
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| InvalidInputError::Header {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| InvalidInputError::Header {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        map.insert(header_name, header_value);
    }
    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(map)
}

/// Map a reqwest error onto the transport taxonomy.
fn map_reqwest(err: reqwest::Error) -> Error {
    let transport = if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else if err.is_decode() {
        return ProtocolError::malformed(err.to_string()).into();
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    transport.into()
}
