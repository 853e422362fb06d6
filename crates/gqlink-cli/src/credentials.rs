//! Location of the stored credentials.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::debug;

use gqlink_core::CredentialSource;
use gqlink_file::FileCredentialSource;

const FILE_NAME: &str = "credentials.json";

/// Get the credentials file path, preferring an explicit one.
pub fn resolve(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => ProjectDirs::from("", "", "gqlink")
            .context("Could not determine data directory")?
            .data_dir()
            .join(FILE_NAME),
    };

    debug!(path = %path.display(), "Using credentials file");
    Ok(path)
}

/// Open the credentials file as a live credential source.
pub fn open(path: &Path) -> Result<Arc<FileCredentialSource>> {
    let source = FileCredentialSource::open(path)
        .with_context(|| format!("Failed to open credentials file {}", path.display()))?;
    Ok(Arc::new(source))
}

/// Same as [`open`], erased for handing to a link.
pub fn open_dyn(path: &Path) -> Result<Arc<dyn CredentialSource>> {
    let source: Arc<dyn CredentialSource> = open(path)?;
    Ok(source)
}
