//! Core gqlink types.
//!
//! These types enforce their invariants at construction time: an
//! [`Endpoint`] always has a streaming counterpart, a [`HeaderSet`] never
//! leaks its credential through Debug output.

pub mod document;
mod endpoint;
mod headers;
mod operation;

pub use document::OperationDefinition;
pub use endpoint::Endpoint;
pub use headers::{AUTHORIZATION, HeaderSet, ROLE};
pub use operation::{ErrorLocation, GraphqlError, Operation, OperationKind, Response};
