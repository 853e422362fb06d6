//! Credential source backed by a watched file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, trace, warn};

use gqlink_core::error::{CredentialError, Error};
use gqlink_core::{
    AccessToken, AuthStateCallback, CredentialSource, Listeners, Result, Subscription,
    TokenCallback,
};

use crate::store;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

struct Shared {
    path: PathBuf,
    token: RwLock<Option<AccessToken>>,
    /// Held for a whole refresh, notifications included, so listeners see
    /// transitions in the order they were applied.
    refreshing: Mutex<()>,
    auth_listeners: Listeners<bool>,
    token_listeners: Listeners<()>,
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, Option<AccessToken>> {
        self.token.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<AccessToken>> {
        self.token.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load(&self) -> Result<Option<AccessToken>> {
        Ok(store::load(&self.path)?
            .and_then(|stored| stored.token().map(AccessToken::new)))
    }

    /// Re-read the file and notify on any transition.
    ///
    /// Listeners run under the refresh lock and must not refresh again.
    fn refresh(&self) -> bool {
        let _refreshing = self
            .refreshing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let next = match self.load() {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Keeping previous credentials");
                return false;
            }
        };

        let previous = {
            let mut current = self.write();
            if *current == next {
                return false;
            }
            std::mem::replace(&mut *current, next.clone())
        };

        match (previous.is_some(), next.is_some()) {
            (false, true) => {
                info!(path = %self.path.display(), "Signed in");
                self.auth_listeners.notify(true);
            }
            (true, false) => {
                info!(path = %self.path.display(), "Signed out");
                self.auth_listeners.notify(false);
            }
            _ => debug!("Token rotated"),
        }
        self.token_listeners.notify(());
        true
    }
}

/// A credential source that follows a JSON credentials file.
///
/// The file holds `{"token": "...", "saved_at": "..."}`; a missing file or
/// token means signed out. Changes are picked up by a filesystem watcher
/// and, inside a Tokio runtime, a 500ms poll. On sign-in and sign-out the
/// auth-state listeners fire first, then the token-changed listeners; a
/// rotated token fires token-changed only.
pub struct FileCredentialSource {
    shared: Arc<Shared>,
    _watcher: Option<RecommendedWatcher>,
}

impl FileCredentialSource {
    /// Open the credentials file at `path` and start following it.
    ///
    /// The file need not exist yet; its directory is created if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let shared = Arc::new(Shared {
            path: path.clone(),
            token: RwLock::new(None),
            refreshing: Mutex::new(()),
            auth_listeners: Listeners::new(),
            token_listeners: Listeners::new(),
        });
        let initial = shared.load()?;
        *shared.write() = initial;

        let watcher = match watch(&shared) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(
                    error = %e,
                    path = %path.display(),
                    "File watching unavailable; polling only"
                );
                None
            }
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(poll(Arc::downgrade(&shared)));
        } else {
            debug!("No runtime; relying on the file watcher");
        }

        debug!(
            path = %path.display(),
            signed_in = shared.read().is_some(),
            "Credentials file opened"
        );
        Ok(Self {
            shared,
            _watcher: watcher,
        })
    }

    /// Returns the followed path.
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Re-read the file now. Returns true if the credentials changed.
    pub fn refresh(&self) -> bool {
        self.shared.refresh()
    }

    /// Write `token` to the file and pick it up immediately.
    pub fn save(&self, token: &str) -> Result<()> {
        store::save(&self.shared.path, token)?;
        self.refresh();
        Ok(())
    }

    /// Remove the file and pick up the sign-out immediately.
    pub fn clear(&self) -> Result<()> {
        store::clear(&self.shared.path)?;
        self.refresh();
        Ok(())
    }
}

fn watch(shared: &Arc<Shared>) -> Result<RecommendedWatcher> {
    let dir = match shared.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(|e| watch_error(&dir, e))?;

    let file_name = shared.path.file_name().map(|n| n.to_os_string());
    let weak = Arc::downgrade(shared);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let Ok(event) = res else {
            return;
        };
        if !matches!(
            event.kind,
            notify::EventKind::Modify(_)
                | notify::EventKind::Create(_)
                | notify::EventKind::Remove(_)
        ) {
            return;
        }
        let ours = event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
        if !ours {
            return;
        }

        if let Some(shared) = weak.upgrade() {
            trace!(kind = ?event.kind, "Credentials file event");
            shared.refresh();
        }
    })
    .map_err(|e| watch_error(&dir, e))?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| watch_error(&dir, e))?;

    Ok(watcher)
}

fn watch_error(dir: &Path, err: impl fmt::Display) -> Error {
    Error::Credential(CredentialError::Unavailable {
        message: format!("cannot watch {}: {}", dir.display(), err),
    })
}

async fn poll(shared: Weak<Shared>) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    loop {
        interval.tick().await;
        match shared.upgrade() {
            Some(shared) => {
                shared.refresh();
            }
            None => break,
        }
    }
}

impl CredentialSource for FileCredentialSource {
    fn is_authenticated(&self) -> Result<bool> {
        Ok(self.shared.read().is_some())
    }

    fn token(&self) -> Result<Option<AccessToken>> {
        Ok(self.shared.read().clone())
    }

    fn on_auth_state_changed(&self, callback: AuthStateCallback) -> Subscription {
        self.shared.auth_listeners.add(callback)
    }

    fn on_token_changed(&self, callback: TokenCallback) -> Subscription {
        self.shared.token_listeners.add(move |()| callback())
    }
}

impl fmt::Debug for FileCredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCredentialSource")
            .field("path", &self.shared.path)
            .field("signed_in", &self.shared.read().is_some())
            .field("watching", &self._watcher.is_some())
            .finish()
    }
}
