//! Local cache file
//!
//! The cache holds the last payload observed from the remote store, either
//! from the initial fetch or from a watch event. Every write replaces the
//! whole file; there is no diffing and no history.

#[cfg(test)]
mod cache_test;

use std::path::Path;
use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::error;

use crate::Error;
use crate::RemoteKey;
use crate::Result;

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Writes payloads to `<root>/<prefix>/<group>/<format>/application.<format>`
#[derive(Debug, Clone)]
pub struct CacheWriter {
    dir: PathBuf,
    path: PathBuf,
}

impl CacheWriter {
    pub fn new(
        root: &Path,
        key: &RemoteKey,
    ) -> Self {
        Self {
            dir: key.cache_dir(root),
            path: key.cache_file(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache directory tree if it does not exist yet
    pub async fn prepare(&self) -> Result<()> {
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(DIR_MODE);

        builder.create(&self.dir).await.map_err(|e| {
            error!("Failed to create cache directory {:?}: {:?}", self.dir, e);
            Error::io(&self.dir, e)
        })
    }

    /// Replace the cache content with `content`
    ///
    /// The payload goes to a sibling temporary file first and is renamed over
    /// the target, so readers never observe a truncated document.
    pub async fn write(
        &self,
        content: &[u8],
    ) -> Result<()> {
        let tmp = self.tmp_path();

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| Error::io(&tmp, e))?;
        file.write_all(content).await.map_err(|e| Error::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| Error::io(&tmp, e))?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(FILE_MODE))
                .await
                .map_err(|e| Error::io(&tmp, e))?;
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::io(&self.path, e));
        }

        debug!(path = ?self.path, len = content.len(), "cache written");
        Ok(())
    }

    /// Current cache content
    pub async fn read(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::io(&self.path, e))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
