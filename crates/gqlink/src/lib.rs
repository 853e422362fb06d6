//! gqlink - Credential-synchronized GraphQL transport switch.
//!
//! Routes subscriptions over a persistent WebSocket and everything else over
//! HTTP, attaches the current credentials to every operation, and reconnects
//! the socket in place when the session changes. A [`SessionContext`]
//! broadcasts sign-in transitions to UI-side consumers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures_util::StreamExt;
//! use gqlink::{Link, MemoryCredentialSource, SessionContext};
//! use gqlink_core::Operation;
//!
//! # async fn example() -> gqlink_core::Result<()> {
//! let source = Arc::new(MemoryCredentialSource::new());
//! let session = SessionContext::new(source.as_ref());
//!
//! let link = Link::builder("https://api.example.com/graphql")
//!     .credentials(source.clone())
//!     .build()?;
//!
//! let mut messages = link
//!     .execute(Operation::new("subscription { messages { id body } }"))
//!     .await?;
//!
//! // Signing in reconnects the socket with an authorization header.
//! source.sign_in("token");
//! assert!(session.signed_in().as_bool().unwrap_or(false));
//!
//! while let Some(message) = messages.next().await {
//!     println!("{:?}", message?.data);
//! }
//! # Ok(())
//! # }
//! ```

pub mod headers;
pub mod http;
pub mod link;
pub mod memory;
pub mod session;
pub mod stream;

pub use headers::{DEFAULT_PUBLIC_ROLE, HeaderComposer, compose};
pub use http::HttpTransport;
pub use link::{Link, LinkBuilder, LinkConfig, Route};
pub use memory::MemoryCredentialSource;
pub use session::{Access, AuthSnapshot, SessionContext, SignInState};
pub use stream::{
    AuthRaceWarning, ConnectionEvent, ConnectionState, CredentialWatch, ReconnectOutcome,
    RetryPolicy, StreamController, StreamOptions, WsProtocol,
};
