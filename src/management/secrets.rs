use std::path::{Path, PathBuf};

use crate::{
    error::{Error, Result},
    types::SecretEntry,
};

/// Disk mirror of the TOTP secret table.
///
/// Written through after every successful remote fetch and read back when
/// the remote document is unreachable.
pub struct SecretStore {
    path: PathBuf,
}

impl SecretStore {
    pub fn new(path: PathBuf) -> Self {
        SecretStore { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Vec<SecretEntry>> {
        let content = async_fs::read(&self.path).await?;
        let entries: Vec<SecretEntry> = serde_json::from_slice(&content)
            .map_err(|e| Error::Decode(format!("failed to process local secrets: {e}")))?;
        Ok(entries)
    }

    /// Stores the raw body as received so the file matches the remote document.
    pub async fn persist(&self, body: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            async_fs::create_dir_all(parent).await?;
        }
        async_fs::write(&self.path, body).await?;
        Ok(())
    }
}
