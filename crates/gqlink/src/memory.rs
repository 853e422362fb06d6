//! In-process credential source.

use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use gqlink_core::{
    AccessToken, AuthStateCallback, CredentialSource, Listeners, Result, Subscription,
    TokenCallback,
};

/// A credential source held in memory.
///
/// Useful when the application manages tokens itself, and in tests. A user
/// is signed in exactly when a token is stored.
///
/// Notifications fire only on actual transitions, after the new state is
/// visible to readers:
///
/// - [`sign_in`](Self::sign_in) from signed out: auth-state `true`, then
///   token-changed
/// - [`set_token`](Self::set_token) while signed in: token-changed only
/// - [`sign_out`](Self::sign_out) while signed in: auth-state `false`, then
///   token-changed
///
/// # Example
///
/// ```
/// use gqlink::MemoryCredentialSource;
/// use gqlink_core::CredentialSource;
///
/// let source = MemoryCredentialSource::new();
/// assert!(!source.is_authenticated().unwrap());
///
/// source.sign_in("abc");
/// assert_eq!(source.token().unwrap().unwrap().as_str(), "abc");
/// ```
pub struct MemoryCredentialSource {
    token: RwLock<Option<AccessToken>>,
    auth_listeners: Listeners<bool>,
    token_listeners: Listeners<()>,
}

impl MemoryCredentialSource {
    /// Create a signed-out source.
    pub fn new() -> Self {
        Self {
            token: RwLock::new(None),
            auth_listeners: Listeners::new(),
            token_listeners: Listeners::new(),
        }
    }

    /// Create a source already signed in with `token`.
    pub fn signed_in(token: impl Into<String>) -> Self {
        let source = Self::new();
        *source.write() = Some(AccessToken::new(token));
        source
    }

    /// Sign in with `token`, or rotate to it if already signed in.
    pub fn sign_in(&self, token: impl Into<String>) {
        let token = AccessToken::new(token);
        let previous = self.write().replace(token.clone());

        match previous {
            None => {
                info!("Signed in");
                self.auth_listeners.notify(true);
                self.token_listeners.notify(());
            }
            Some(previous) if previous != token => {
                debug!("Token rotated on sign-in");
                self.token_listeners.notify(());
            }
            Some(_) => {}
        }
    }

    /// Replace the token of the signed-in user.
    ///
    /// Returns false (and changes nothing) when no user is signed in.
    pub fn set_token(&self, token: impl Into<String>) -> bool {
        let token = AccessToken::new(token);
        let changed = {
            let mut current = self.write();
            match current.as_ref() {
                None => {
                    debug!("Ignoring token update while signed out");
                    return false;
                }
                Some(existing) if *existing == token => false,
                Some(_) => {
                    *current = Some(token);
                    true
                }
            }
        };

        if changed {
            debug!("Token rotated");
            self.token_listeners.notify(());
        }
        true
    }

    /// Sign out, dropping the stored token.
    pub fn sign_out(&self) {
        if self.write().take().is_some() {
            info!("Signed out");
            self.auth_listeners.notify(false);
            self.token_listeners.notify(());
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<AccessToken>> {
        self.token.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<AccessToken>> {
        self.token.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryCredentialSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSource for MemoryCredentialSource {
    fn is_authenticated(&self) -> Result<bool> {
        Ok(self.read().is_some())
    }

    fn token(&self) -> Result<Option<AccessToken>> {
        Ok(self.read().clone())
    }

    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> Subscription {
        self.auth_listeners.add(callback)
    }

    fn on_token_changed(&self, callback: TokenCallback) -> Subscription {
        self.token_listeners.add(move |()| callback())
    }
}

impl fmt::Debug for MemoryCredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCredentialSource")
            .field("signed_in", &self.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn record(source: &MemoryCredentialSource) -> (Arc<Mutex<Vec<String>>>, Vec<Subscription>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let auth_log = log.clone();
        let token_log = log.clone();
        let subs = vec![
            source.on_auth_state_changed(Box::new(move |signed_in| {
                auth_log.lock().unwrap().push(format!("auth:{}", signed_in));
            })),
            source.on_token_changed(Box::new(move || {
                token_log.lock().unwrap().push("token".to_string());
            })),
        ];
        (log, subs)
    }

    #[test]
    fn sign_in_fires_auth_then_token() {
        let source = MemoryCredentialSource::new();
        let (log, _subs) = record(&source);

        source.sign_in("abc");
        assert_eq!(*log.lock().unwrap(), vec!["auth:true", "token"]);
    }

    #[test]
    fn rotation_fires_token_only() {
        let source = MemoryCredentialSource::signed_in("a");
        let (log, _subs) = record(&source);

        assert!(source.set_token("b"));
        source.sign_in("c");
        source.sign_in("c");
        assert_eq!(*log.lock().unwrap(), vec!["token", "token"]);
    }

    #[test]
    fn set_token_while_signed_out_is_ignored() {
        let source = MemoryCredentialSource::new();
        let (log, _subs) = record(&source);

        assert!(!source.set_token("x"));
        assert!(!source.is_authenticated().unwrap());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn sign_out_fires_once() {
        let source = MemoryCredentialSource::signed_in("a");
        let (log, _subs) = record(&source);

        source.sign_out();
        source.sign_out();
        assert_eq!(*log.lock().unwrap(), vec!["auth:false", "token"]);
        assert!(source.token().unwrap().is_none());
    }

    #[test]
    fn listeners_see_new_state() {
        let source = Arc::new(MemoryCredentialSource::new());
        let seen = Arc::new(Mutex::new(None));

        let reader = source.clone();
        let slot = seen.clone();
        let _sub = source.on_token_changed(Box::new(move || {
            *slot.lock().unwrap() = reader.token().unwrap().map(|t| t.as_str().to_string());
        }));

        source.sign_in("fresh");
        assert_eq!(seen.lock().unwrap().as_deref(), Some("fresh"));
    }
}
