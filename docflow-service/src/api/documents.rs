use axum::{
    Json,
    extract::{Multipart, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::AppState;
use crate::error::ServiceError;
use crate::upload::UploadOutcome;
use crate::workflow::ExecutionSummary;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub user: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionSummary>,
}

/// Latest ingestion run, optionally for one user.
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ServiceError> {
    let execution = state.service.latest_run(query.user.as_deref()).await?;
    Ok(Json(StatusResponse {
        found: execution.is_some(),
        execution,
    }))
}

/// Multipart upload with a `file` field and an optional `user` field.
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, ServiceError> {
    let mut file_data: Option<(bytes::Bytes, String)> = None;
    let mut user: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidEvent {
            message: e.to_string(),
        })?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("document").to_string();
                let data = field.bytes().await.map_err(|e| ServiceError::InvalidEvent {
                    message: e.to_string(),
                })?;
                file_data = Some((data, filename));
            }
            "user" => {
                let value = field.text().await.map_err(|e| ServiceError::InvalidEvent {
                    message: e.to_string(),
                })?;
                if !value.trim().is_empty() {
                    user = Some(value);
                }
            }
            _ => {}
        }
    }

    let (data, filename) = file_data.ok_or_else(|| ServiceError::InvalidEvent {
        message: "No file provided".to_string(),
    })?;

    let outcome = state
        .service
        .upload_document(&filename, user.as_deref(), data)
        .await?;
    Ok(Json(outcome))
}
