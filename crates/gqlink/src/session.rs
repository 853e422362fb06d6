//! Observable sign-in state for UI-side consumers.

use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use gqlink_core::{CredentialSource, Subscription};

/// Whether a user is signed in, as far as the context knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SignInState {
    /// Not yet known, or the source could not answer.
    #[default]
    Unknown,
    SignedIn,
    SignedOut,
}

impl SignInState {
    pub fn from_signed_in(signed_in: bool) -> Self {
        if signed_in {
            Self::SignedIn
        } else {
            Self::SignedOut
        }
    }

    /// `Some(true)`/`Some(false)` once known.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::SignedIn => Some(true),
            Self::SignedOut => Some(false),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl From<Option<bool>> for SignInState {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Unknown, Self::from_signed_in)
    }
}

impl fmt::Display for SignInState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::SignedIn => "signed in",
            Self::SignedOut => "signed out",
        })
    }
}

/// The serialized form of a [`SignInState`]: `{"signedIn": true|false|null}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSnapshot {
    pub signed_in: Option<bool>,
}

impl From<SignInState> for AuthSnapshot {
    fn from(state: SignInState) -> Self {
        Self {
            signed_in: state.as_bool(),
        }
    }
}

/// What a protected view should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Sign-in state not resolved yet; render a placeholder.
    Pending,
    /// Signed out; redirect to sign-in.
    Denied,
    Granted,
}

impl From<SignInState> for Access {
    fn from(state: SignInState) -> Self {
        match state {
            SignInState::Unknown => Access::Pending,
            SignInState::SignedOut => Access::Denied,
            SignInState::SignedIn => Access::Granted,
        }
    }
}

/// A read-only sign-in cell that follows a credential source.
///
/// The cell starts from the source's answer at construction and is then
/// written only by the source's auth-state notifications. Readers never
/// poll: [`subscribe`](Self::subscribe) and [`changes`](Self::changes)
/// wake on every transition.
///
/// Dropping the context stops following the source.
///
/// # Example
///
/// ```
/// use gqlink::{MemoryCredentialSource, SessionContext, SignInState};
///
/// let source = MemoryCredentialSource::new();
/// let session = SessionContext::new(&source);
/// assert_eq!(session.signed_in(), SignInState::SignedOut);
///
/// source.sign_in("abc");
/// assert_eq!(session.signed_in(), SignInState::SignedIn);
/// ```
pub struct SessionContext {
    cell: Arc<watch::Sender<SignInState>>,
    _subscription: Option<Subscription>,
}

impl SessionContext {
    /// Follow `source`.
    pub fn new(source: &dyn CredentialSource) -> Self {
        let (sender, _) = watch::channel(SignInState::Unknown);
        let cell = Arc::new(sender);

        let weak: Weak<watch::Sender<SignInState>> = Arc::downgrade(&cell);
        let subscription = source.on_auth_state_changed(Box::new(move |signed_in| {
            // A context already torn down ignores late notifications.
            if let Some(cell) = weak.upgrade() {
                let state = SignInState::from_signed_in(signed_in);
                debug!(%state, "Sign-in state updated");
                cell.send_replace(state);
            }
        }));

        let initial = match source.is_authenticated() {
            Ok(signed_in) => SignInState::from_signed_in(signed_in),
            Err(e) => {
                warn!(error = %e, "Credential source failed; sign-in state unknown");
                SignInState::Unknown
            }
        };
        // A notification that raced the initial query is newer; keep it.
        cell.send_if_modified(|state| {
            if *state == SignInState::Unknown && initial.is_known() {
                *state = initial;
                true
            } else {
                false
            }
        });

        Self {
            cell,
            _subscription: Some(subscription),
        }
    }

    /// A context with no source, pinned to [`SignInState::Unknown`].
    pub fn detached() -> Self {
        let (sender, _) = watch::channel(SignInState::Unknown);
        Self {
            cell: Arc::new(sender),
            _subscription: None,
        }
    }

    /// Returns the current state.
    pub fn signed_in(&self) -> SignInState {
        *self.cell.borrow()
    }

    /// Returns the current state in its serialized form.
    pub fn snapshot(&self) -> AuthSnapshot {
        self.signed_in().into()
    }

    /// Returns what a protected view should do now.
    pub fn access(&self) -> Access {
        self.signed_in().into()
    }

    /// Watch the state. The receiver sees the current value immediately.
    pub fn subscribe(&self) -> watch::Receiver<SignInState> {
        self.cell.subscribe()
    }

    /// The state as a stream: the current value, then every change.
    pub fn changes(&self) -> WatchStream<SignInState> {
        WatchStream::new(self.subscribe())
    }

    /// Wait until the state is known and return whether a user is signed in.
    ///
    /// Never resolves for a [`detached`](Self::detached) context.
    pub async fn resolved(&self) -> bool {
        let mut receiver = self.subscribe();
        match receiver.wait_for(SignInState::is_known).await {
            Ok(state) => *state == SignInState::SignedIn,
            // The sender lives as long as `self`.
            Err(_) => false,
        }
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("state", &self.signed_in())
            .field("attached", &self._subscription.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::StreamExt;
    use gqlink_core::error::CredentialError;
    use gqlink_core::{AccessToken, AuthStateCallback, Listeners, Result, TokenCallback};

    use crate::MemoryCredentialSource;

    /// Fails every query but still delivers notifications.
    #[derive(Default)]
    struct FlakySource {
        listeners: Listeners<bool>,
    }

    impl CredentialSource for FlakySource {
        fn is_authenticated(&self) -> Result<bool> {
            Err(CredentialError::Unavailable {
                message: "not ready".to_string(),
            }
            .into())
        }

        fn token(&self) -> Result<Option<AccessToken>> {
            Ok(None)
        }

        fn on_auth_state_changed(&self, callback: AuthStateCallback) -> Subscription {
            self.listeners.add(callback)
        }

        fn on_token_changed(&self, _callback: TokenCallback) -> Subscription {
            Subscription::noop()
        }
    }

    #[test]
    fn initial_value_comes_from_source() {
        let signed_in = MemoryCredentialSource::signed_in("abc");
        assert_eq!(
            SessionContext::new(&signed_in).signed_in(),
            SignInState::SignedIn
        );

        let signed_out = MemoryCredentialSource::new();
        assert_eq!(
            SessionContext::new(&signed_out).signed_in(),
            SignInState::SignedOut
        );
    }

    #[test]
    fn follows_notifications() {
        let source = MemoryCredentialSource::new();
        let session = SessionContext::new(&source);

        source.sign_in("abc");
        assert_eq!(session.signed_in(), SignInState::SignedIn);
        assert_eq!(session.access(), Access::Granted);

        source.sign_out();
        assert_eq!(session.signed_in(), SignInState::SignedOut);
        assert_eq!(session.access(), Access::Denied);
    }

    #[test]
    fn source_error_means_unknown_until_notified() {
        let source = FlakySource::default();
        let session = SessionContext::new(&source);
        assert_eq!(session.signed_in(), SignInState::Unknown);
        assert_eq!(session.access(), Access::Pending);

        source.listeners.notify(true);
        assert_eq!(session.signed_in(), SignInState::SignedIn);
    }

    #[test]
    fn dropping_context_unsubscribes() {
        let source = FlakySource::default();
        let session = SessionContext::new(&source);
        assert_eq!(source.listeners.len(), 1);

        drop(session);
        assert!(source.listeners.is_empty());
        assert_eq!(source.listeners.notify(true), 0);
    }

    #[test]
    fn snapshot_serializes_tri_state() {
        let source = MemoryCredentialSource::new();
        let session = SessionContext::new(&source);
        assert_eq!(
            serde_json::to_value(session.snapshot()).unwrap(),
            serde_json::json!({"signedIn": false})
        );

        source.sign_in("abc");
        assert_eq!(
            serde_json::to_value(session.snapshot()).unwrap(),
            serde_json::json!({"signedIn": true})
        );

        assert_eq!(
            serde_json::to_value(SessionContext::detached().snapshot()).unwrap(),
            serde_json::json!({"signedIn": null})
        );
    }

    #[tokio::test]
    async fn subscribers_wake_on_transition() {
        let source = MemoryCredentialSource::new();
        let session = SessionContext::new(&source);
        let mut receiver = session.subscribe();

        source.sign_in("abc");
        tokio::time::timeout(Duration::from_secs(1), receiver.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*receiver.borrow(), SignInState::SignedIn);
    }

    #[tokio::test]
    async fn change_stream_starts_with_current_value() {
        let source = MemoryCredentialSource::new();
        let session = SessionContext::new(&source);
        let mut changes = session.changes();

        assert_eq!(changes.next().await, Some(SignInState::SignedOut));
        source.sign_in("abc");
        assert_eq!(changes.next().await, Some(SignInState::SignedIn));
    }

    #[tokio::test]
    async fn resolved_waits_for_known_state() {
        let source = Arc::new(FlakySource::default());
        let session = SessionContext::new(source.as_ref());

        let notifier = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            notifier.listeners.notify(false);
        });

        let signed_in = tokio::time::timeout(Duration::from_secs(1), session.resolved())
            .await
            .unwrap();
        assert!(!signed_in);
    }

    #[test]
    fn detached_context_stays_unknown() {
        let session = SessionContext::detached();
        assert_eq!(session.signed_in(), SignInState::Unknown);
        assert_eq!(session.access(), Access::Pending);
    }
}
