//! Document upload.
//!
//! Stores a user's document under the upload prefix. Storage backends without
//! change notifications get one synthesized and passed to the trigger.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::config::UploadConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::event::{HandlerResponse, StorageEvent};
use crate::paths::ObjectKeyPath;
use crate::storage::ObjectStore;
use crate::trigger::OrchestrationTrigger;

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub bucket: String,
    pub key: String,
    pub triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_response: Option<HandlerResponse<String>>,
}

pub struct DocumentUploader {
    store: Arc<dyn ObjectStore>,
    trigger: Option<Arc<OrchestrationTrigger>>,
    bucket: String,
    base_path: String,
}

impl DocumentUploader {
    /// `trigger` is only called when `config.notify` is set.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        trigger: Arc<OrchestrationTrigger>,
        config: &UploadConfig,
    ) -> Self {
        Self {
            store,
            trigger: config.notify.then_some(trigger),
            bucket: config.bucket.clone(),
            base_path: config.base_path.clone(),
        }
    }

    pub async fn upload(
        &self,
        file_name: &str,
        user: Option<&str>,
        body: Bytes,
    ) -> ServiceResult<UploadOutcome> {
        let key = upload_key(&self.base_path, user, file_name)?;
        self.store.put_object(&self.bucket, &key, body).await?;
        info!(bucket = %self.bucket, key = %key, "Document uploaded");

        let trigger_response = match &self.trigger {
            Some(trigger) => {
                let event = StorageEvent::object_created(&self.bucket, &key);
                let raw = serde_json::to_value(&event).map_err(|e| ServiceError::Internal {
                    message: format!("failed to build notification: {e}"),
                })?;
                let response = trigger.handle(&raw).await;
                if response.status_code != 200 {
                    return Err(ServiceError::IngestionNotStarted {
                        key,
                        message: response.body,
                    });
                }
                Some(response)
            }
            None => None,
        };

        Ok(UploadOutcome {
            bucket: self.bucket.clone(),
            key,
            triggered: trigger_response.is_some(),
            trigger_response,
        })
    }
}

/// `{base_path}/{user}/{file_name}`, with `/` in the file name replaced by
/// `+` so it stays one segment.
///
/// The result must have the 4- or 5-segment layout so that the run name,
/// built from the fourth segment on, carries the user and file name.
pub fn upload_key(base_path: &str, user: Option<&str>, file_name: &str) -> ServiceResult<String> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(ServiceError::InvalidEvent {
            message: "file name is empty".to_string(),
        });
    }
    let file_name = file_name.replace('/', "+");
    let base_path = base_path.trim_matches('/');

    let key = match user.map(str::trim).filter(|u| !u.is_empty()) {
        Some(user) if user.contains('/') => {
            return Err(ServiceError::InvalidEvent {
                message: format!("user name {user:?} contains '/'"),
            });
        }
        Some(user) => format!("{base_path}/{user}/{file_name}"),
        None => format!("{base_path}/{file_name}"),
    };
    ObjectKeyPath::parse_strict(&key)?;
    Ok(key)
}
