use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

/// The on-disk directory holding the chat client's linked-device credentials.
///
/// The session never reads the contents; it only hands the path to the client
/// and removes the directory on logout.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Remove the directory and everything under it. Missing is not an error.
    pub async fn discard(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                info!(path = %self.dir.display(), "credential store removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new("./auth_info")
    }
}
