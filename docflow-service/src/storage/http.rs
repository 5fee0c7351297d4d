//! Path-style S3-compatible object store over plain HTTP.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use super::{ObjectStore, storage_error};
use crate::error::{ExternalServiceError, ServiceError, ServiceResult};

pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: &str, timeout_secs: u64) -> ServiceResult<Self> {
        let endpoint = endpoint.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::External(ExternalServiceError::Connection {
                    url: endpoint.clone(),
                    source: e,
                })
            })?;

        Ok(Self { client, endpoint })
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}/{}", self.endpoint, bucket, encoded_key)
    }

    async fn put_bytes(
        &self,
        operation: &'static str,
        bucket: &str,
        key: &str,
        body: Bytes,
    ) -> ServiceResult<()> {
        let url = self.object_url(bucket, key);
        let response = self
            .client
            .put(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| storage_error(operation, bucket, key, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(storage_error(
                operation,
                bucket,
                key,
                ExternalServiceError::Status {
                    url,
                    status,
                    message,
                },
            ));
        }

        debug!(bucket, key, "Uploaded object");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download_file(&self, bucket: &str, key: &str, dest: &Path) -> ServiceResult<()> {
        let url = self.object_url(bucket, key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| storage_error("download", bucket, key, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(storage_error(
                "download",
                bucket,
                key,
                ExternalServiceError::Status {
                    url,
                    status,
                    message,
                },
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| storage_error("download", bucket, key, e))?;
        tokio::fs::write(dest, &body)
            .await
            .map_err(|e| storage_error("download", bucket, key, e))?;

        debug!(bucket, key, size = body.len(), "Downloaded object");
        Ok(())
    }

    async fn upload_file(&self, bucket: &str, key: &str, src: &Path) -> ServiceResult<()> {
        let body = tokio::fs::read(src)
            .await
            .map_err(|e| storage_error("upload", bucket, key, e))?;
        self.put_bytes("upload", bucket, key, Bytes::from(body)).await
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> ServiceResult<()> {
        self.put_bytes("put", bucket, key, body).await
    }
}
