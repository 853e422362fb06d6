//! gqlink-core - Core types and traits for the gqlink GraphQL auth transport.

pub mod error;
pub mod tokens;
pub mod traits;
pub mod types;

pub use error::Error;
pub use tokens::AccessToken;
pub use traits::{
    AuthStateCallback, CredentialSource, Listeners, ResponseStream, Subscription, TokenCallback,
    Transport,
};
pub use types::{Endpoint, GraphqlError, HeaderSet, Operation, OperationKind, Response};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
