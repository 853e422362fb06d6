//! Core traits for credential sources and transports.

mod credentials;
mod listeners;
mod transport;

pub use credentials::{AuthStateCallback, CredentialSource, TokenCallback};
pub use listeners::{Listeners, Subscription};
pub use transport::{ResponseStream, Transport};
