use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::{ObjectStream, RawStorage};
use crate::error::{Error, Result};

/// Filesystem-backed raw storage rooted at a single directory. Used when
/// no S3 endpoint is configured.
pub struct LocalRawStorage {
    root: PathBuf,
}

impl LocalRawStorage {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if root.is_file() {
            return Err(Error::Permanent(format!(
                "raw storage root {} is a file, expected a directory",
                root.display()
            )));
        }
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RawStorage for LocalRawStorage {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.full_path(path);
        if fs::try_exists(&full).await? {
            return Err(Error::Internal(format!("blob path collision: {path}")));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so readers never observe a partial object.
        let tmp = full.with_extension("part");
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &full).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.full_path(path);
        if !fs::try_exists(&full).await? {
            return Err(Error::not_found("blob", path));
        }
        Ok(fs::read(&full).await?)
    }

    async fn open(&self, path: &str) -> Result<ObjectStream> {
        let full = self.full_path(path);
        let file = match fs::File::open(&full).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found("blob", path));
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata().await?.len();
        Ok(ObjectStream {
            size,
            reader: Box::new(file),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.full_path(path);
        match fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let dir = self.full_path(prefix.trim_end_matches('/'));
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(prefix, error = %e, "failed to remove blob prefix");
                Err(e.into())
            }
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(self.full_path(path)).await?)
    }
}
