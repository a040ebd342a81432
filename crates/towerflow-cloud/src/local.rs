//! Filesystem-backed object store
//!
//! Each bucket is a directory below the store root. Overwriting an object
//! keeps the previous content next to it as `<key>.backup`.

use crate::error::{CloudError, Result};
use crate::provider::ObjectStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

const BACKUP_SUFFIX: &str = ".backup";

/// Object store rooted at a local directory
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket).join(key)
    }

    fn backup_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.bucket_dir(bucket)
            .join(format!("{}{}", key, BACKUP_SUFFIX))
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<PathBuf> {
        let dir = self.bucket_dir(bucket);
        if !dir.is_dir() {
            return Err(CloudError::ResourceNotFound(format!(
                "bucket {} does not exist",
                bucket
            )));
        }
        Ok(dir)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.bucket_dir(bucket).is_dir())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        let dir = self.bucket_dir(bucket);
        fs::create_dir_all(&dir).await?;
        tracing::debug!("Created bucket directory: {}", dir.display());
        Ok(())
    }

    async fn has_file(&self, bucket: &str, key: &str) -> Result<bool> {
        Ok(self.object_path(bucket, key).is_file())
    }

    async fn load_file(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.ensure_bucket(bucket).await?;
        let path = self.object_path(bucket, key);
        if !path.is_file() {
            return Err(CloudError::ResourceNotFound(format!(
                "{} not found in bucket {}",
                key, bucket
            )));
        }
        Ok(fs::read(&path).await?)
    }

    async fn write_file(&self, bucket: &str, key: &str, contents: &[u8]) -> Result<()> {
        self.ensure_bucket(bucket).await?;

        let path = self.object_path(bucket, key);
        if path.exists() {
            let backup = self.backup_path(bucket, key);
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(&path, &backup).await?;
            tracing::debug!("Created backup of {}", key);
        }

        fs::write(&path, contents).await?;
        tracing::debug!("Wrote {} bytes to {}/{}", contents.len(), bucket, key);
        Ok(())
    }

    async fn delete_versioned_bucket(&self, bucket: &str) -> Result<()> {
        let dir = self.bucket_dir(bucket);
        if dir.exists() {
            fs::remove_dir_all(&dir).await?;
            tracing::debug!("Deleted bucket directory: {}", dir.display());
        }
        Ok(())
    }
}
