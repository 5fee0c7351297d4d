//! Object storage access.
//!
//! Stages never hold a global client; they receive an `Arc<dyn ObjectStore>`.

mod fs;
mod http;

pub use fs::FsObjectStore;
pub use http::HttpObjectStore;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{ExternalServiceError, ServiceError, ServiceResult};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Copy `bucket/key` into a local file, replacing it if present.
    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> ServiceResult<()>;

    /// Store a local file's contents at `bucket/key`.
    async fn upload_file(&self, bucket: &str, key: &str, src: &Path) -> ServiceResult<()>;

    /// Store bytes at `bucket/key`.
    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> ServiceResult<()>;
}

pub(crate) fn storage_error(
    operation: &'static str,
    bucket: &str,
    key: &str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> ServiceError {
    ServiceError::External(ExternalServiceError::Storage {
        operation,
        bucket: bucket.to_string(),
        key: key.to_string(),
        source: source.into(),
    })
}
