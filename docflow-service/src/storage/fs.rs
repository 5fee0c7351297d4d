//! Filesystem-backed object store: each bucket is a directory under a root.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{ObjectStore, storage_error};
use crate::error::ServiceResult;

pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve `bucket/key` below the root, refusing anything that would
    /// climb out of it.
    fn object_path(&self, bucket: &str, key: &str) -> std::io::Result<PathBuf> {
        let relative = Path::new(bucket).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || bucket.is_empty() || key.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid object location {bucket}/{key}"),
            ));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> ServiceResult<()> {
        let src = self
            .object_path(bucket, key)
            .map_err(|e| storage_error("download", bucket, key, e))?;
        tokio::fs::copy(&src, dest)
            .await
            .map_err(|e| storage_error("download", bucket, key, e))?;
        debug!(bucket, key, dest = %dest.display(), "Downloaded object");
        Ok(())
    }

    async fn upload_file(&self, bucket: &str, key: &str, src: &Path) -> ServiceResult<()> {
        let dest = self
            .object_path(bucket, key)
            .map_err(|e| storage_error("upload", bucket, key, e))?;
        Self::ensure_parent(&dest)
            .await
            .map_err(|e| storage_error("upload", bucket, key, e))?;
        tokio::fs::copy(src, &dest)
            .await
            .map_err(|e| storage_error("upload", bucket, key, e))?;
        debug!(bucket, key, "Uploaded object");
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> ServiceResult<()> {
        let dest = self
            .object_path(bucket, key)
            .map_err(|e| storage_error("put", bucket, key, e))?;
        Self::ensure_parent(&dest)
            .await
            .map_err(|e| storage_error("put", bucket, key, e))?;
        tokio::fs::write(&dest, &body)
            .await
            .map_err(|e| storage_error("put", bucket, key, e))?;
        debug!(bucket, key, size = body.len(), "Stored object");
        Ok(())
    }
}
