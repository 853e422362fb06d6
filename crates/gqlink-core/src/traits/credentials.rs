//! Credential source trait.

use crate::{AccessToken, Result};

use super::Subscription;

/// Callback invoked with the new sign-in status.
pub type AuthStateCallback = Box<dyn Fn(bool) + Send + Sync>;

/// Callback invoked when the token value changes.
pub type TokenCallback = Box<dyn Fn() + Send + Sync>;

/// The session/auth provider an application already has.
///
/// gqlink only reads from a source and listens to it; acquiring and
/// refreshing tokens stays the source's business.
///
/// The query methods are fallible so a source that cannot answer (torn
/// down, not yet initialized) can say so. Every component in this workspace
/// that queries a source catches such errors, logs them, and proceeds as if
/// the user were signed out.
pub trait CredentialSource: Send + Sync {
    /// Returns whether a user is currently authenticated.
    fn is_authenticated(&self) -> Result<bool>;

    /// Returns the current bearer token, if any.
    fn token(&self) -> Result<Option<AccessToken>>;

    /// Register for sign-in/sign-out transitions.
    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> Subscription;

    /// Register for token value changes (rotation, refresh).
    fn on_token_changed(&self, callback: TokenCallback) -> Subscription;
}
