use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;
use std::sync::Arc;

use super::AppState;
use crate::error::ServiceError;
use crate::service::ExecutionDetail;

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

pub async fn get_execution_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ExecutionDetail>, ServiceError> {
    Ok(Json(state.service.describe_execution(&name).await?))
}

/// `stopped` is false when the execution had already finished.
pub async fn stop_execution_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<StopResponse>, ServiceError> {
    let stopped = state.service.stop_execution(&name)?;
    Ok(Json(StopResponse { stopped }))
}
