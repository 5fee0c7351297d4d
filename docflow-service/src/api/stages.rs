//! Stage endpoints.
//!
//! Stages propagate failures as error responses; only the trigger folds
//! them into its envelope.

use axum::{Json, extract::State};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use super::AppState;
use crate::error::ServiceError;
use crate::event::{HandlerResponse, StorageEvent};
use crate::images::PageImageMap;
use crate::ocr::{AnalysisStatus, LaunchedJob, OcrResults};

#[derive(Debug, Deserialize)]
pub struct WaitRequest {
    #[serde(rename = "JobId")]
    pub job_id: String,
}

pub async fn classify_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<StorageEvent>,
) -> Result<Json<StorageEvent>, ServiceError> {
    Ok(Json(state.service.classify(event)?))
}

pub async fn launch_ocr_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<StorageEvent>,
) -> Result<Json<HandlerResponse<Option<LaunchedJob>>>, ServiceError> {
    Ok(Json(state.service.launch_ocr(&event).await?))
}

pub async fn wait_ocr_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WaitRequest>,
) -> Result<Json<HandlerResponse<AnalysisStatus>>, ServiceError> {
    Ok(Json(state.service.wait_ocr(&request.job_id).await?))
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<StorageEvent>,
) -> Result<Json<HandlerResponse<OcrResults>>, ServiceError> {
    Ok(Json(state.service.analyze(&event).await?))
}

pub async fn extract_images_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<StorageEvent>,
) -> Result<Json<HandlerResponse<PageImageMap>>, ServiceError> {
    Ok(Json(state.service.extract_images(&event).await?))
}

pub async fn trigger_handler(
    State(state): State<Arc<AppState>>,
    Json(raw): Json<Value>,
) -> Json<HandlerResponse<String>> {
    Json(state.service.trigger(&raw).await)
}
