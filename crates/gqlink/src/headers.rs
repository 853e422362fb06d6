//! Header composition for outbound operations.
//!
//! Every operation gets a freshly composed [`HeaderSet`]: the static headers
//! plus exactly one credential header, `authorization` for an authenticated
//! session or `role` for anonymous access. Nothing is memoized; the
//! credential source is read at the moment of composition.

use std::fmt;
use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, warn};

use gqlink_core::error::ConfigError;
use gqlink_core::types::{AUTHORIZATION, ROLE};
use gqlink_core::{AccessToken, CredentialSource, HeaderSet, Result};

/// The role sent when no user is authenticated.
pub const DEFAULT_PUBLIC_ROLE: &str = "public";

/// Compose the headers for one outbound operation.
///
/// - source present and authenticated: `static_headers` plus
///   `authorization: Bearer <token>`
/// - source present but not authenticated: `static_headers` plus
///   `role: <public_role>`
/// - no source: `static_headers` unchanged
///
/// A source that fails to answer, or reports authenticated without a token,
/// is treated as not authenticated.
pub fn compose(
    static_headers: &HeaderSet,
    source: Option<&dyn CredentialSource>,
    public_role: &str,
) -> HeaderSet {
    let mut headers = static_headers.clone();

    let Some(source) = source else {
        return headers;
    };

    match current_token(source) {
        Some(token) => headers.insert(AUTHORIZATION, token.bearer()),
        None => headers.insert(ROLE, public_role),
    }

    headers
}

/// Reads the bearer token if, and only if, the source reports a signed-in user.
fn current_token(source: &dyn CredentialSource) -> Option<AccessToken> {
    match source.is_authenticated() {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            warn!(error = %e, "Credential source failed; composing anonymous headers");
            return None;
        }
    }

    match source.token() {
        Ok(Some(token)) => Some(token),
        Ok(None) => {
            debug!("Authenticated without a token; composing anonymous headers");
            None
        }
        Err(e) => {
            warn!(error = %e, "Credential source failed; composing anonymous headers");
            None
        }
    }
}

/// Composes headers from a credential source, static headers and a public
/// role.
///
/// Cheap to clone; shared by the request/response transport (HTTP headers)
/// and the streaming transport (connection parameters).
///
/// # Example
///
/// ```
/// use gqlink::HeaderComposer;
/// use gqlink_core::HeaderSet;
///
/// let static_headers: HeaderSet = [("x-app", "1")].into_iter().collect();
/// let composer = HeaderComposer::new(static_headers.clone(), None, "public").unwrap();
///
/// assert_eq!(composer.compose(), static_headers);
/// ```
#[derive(Clone)]
pub struct HeaderComposer {
    static_headers: HeaderSet,
    source: Option<Arc<dyn CredentialSource>>,
    public_role: String,
}

impl HeaderComposer {
    /// Create a composer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReservedHeader`] if a static header is named
    /// `authorization` or `role` (ignoring case).
    pub fn new(
        static_headers: HeaderSet,
        source: Option<Arc<dyn CredentialSource>>,
        public_role: impl Into<String>,
    ) -> Result<Self> {
        for reserved in [AUTHORIZATION, ROLE] {
            if static_headers.contains(reserved) {
                return Err(ConfigError::ReservedHeader {
                    name: reserved.to_string(),
                }
                .into());
            }
        }

        Ok(Self {
            static_headers,
            source,
            public_role: public_role.into(),
        })
    }

    /// Compose the HTTP headers for one operation.
    pub fn compose(&self) -> HeaderSet {
        compose(
            &self.static_headers,
            self.source.as_deref(),
            &self.public_role,
        )
    }

    /// Compose the `connection_init` payload for a WebSocket handshake.
    ///
    /// The handshake carries the same headers wrapped as
    /// `{"headers": {...}}`.
    pub fn connection_params(&self) -> Value {
        json!({ "headers": self.compose() })
    }

    /// Returns the credential source, if any.
    pub fn source(&self) -> Option<&Arc<dyn CredentialSource>> {
        self.source.as_ref()
    }

    pub fn static_headers(&self) -> &HeaderSet {
        &self.static_headers
    }

    pub fn public_role(&self) -> &str {
        &self.public_role
    }
}

impl fmt::Debug for HeaderComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderComposer")
            .field("static_headers", &self.static_headers)
            .field("has_source", &self.source.is_some())
            .field("public_role", &self.public_role)
            .finish()
    }
}
