//! On-disk credentials file.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use gqlink_core::Result;
use gqlink_core::error::{CredentialError, Error};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn map_io(err: std::io::Error) -> Error {
    Error::Credential(CredentialError::Read {
        message: format!("IO error: {}", err),
    })
}

/// Contents of a credentials file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    /// The bearer token. Absent or empty means signed out.
    #[serde(default)]
    pub token: Option<String>,
    /// When the token was written.
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl StoredCredentials {
    /// The token, if one is stored and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Run `f` holding the exclusive lock next to `path`.
fn with_lock<T>(path: &Path, f: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(map_io)?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path(path))
        .map_err(map_io)?;

    lock_file.lock_exclusive().map_err(map_io)?;
    let result = f();
    lock_file.unlock().map_err(map_io)?;
    result
}

/// Read the credentials file. A missing file reads as `None`.
pub fn load(path: &Path) -> Result<Option<StoredCredentials>> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(map_io(e)),
    };

    if json.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(&json).map(Some).map_err(|e| {
        Error::Credential(CredentialError::Read {
            message: format!("invalid credentials file {}: {}", path.display(), e),
        })
    })
}

/// Store `token` at `path`, readable by the owner only.
///
/// The file is replaced atomically, so watchers never see a partial write.
#[instrument(skip(path, token), fields(path = %path.display()))]
pub fn save(path: &Path, token: &str) -> Result<StoredCredentials> {
    let stored = StoredCredentials {
        token: Some(token.to_string()),
        saved_at: Some(Utc::now()),
    };
    let json = serde_json::to_string_pretty(&stored).map_err(|e| {
        Error::Credential(CredentialError::Read {
            message: e.to_string(),
        })
    })?;

    with_lock(path, || {
        let temp = temp_path(path);
        let mut file = fs::File::create(&temp).map_err(map_io)?;

        #[cfg(unix)]
        {
            let mut perms = file.metadata().map_err(map_io)?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&temp, perms).map_err(map_io)?;
        }

        file.write_all(json.as_bytes()).map_err(map_io)?;
        file.sync_data().map_err(map_io)?;
        fs::rename(&temp, path).map_err(map_io)?;
        Ok(())
    })?;

    debug!("Credentials saved");
    Ok(stored)
}

/// Remove the credentials file. Returns false if there was none.
#[instrument(skip(path), fields(path = %path.display()))]
pub fn clear(path: &Path) -> Result<bool> {
    let removed = with_lock(path, || match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(map_io(e)),
    })?;

    debug!(removed, "Credentials cleared");
    Ok(removed)
}
