use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No records to process")]
    NoRecords,

    #[error("Document type not available for {object_key}")]
    UnsupportedDocumentType { object_key: String },

    #[error("Invalid event: {message}")]
    InvalidEvent { message: String },

    #[error("Object key has too few path segments: {object_key}")]
    InvalidObjectKey { object_key: String },

    #[error("External service call failed")]
    External(#[from] ExternalServiceError),

    #[error("Scratch resource failure")]
    Scratch(#[from] ScratchResourceError),

    #[error("Job {job_id} still in progress after {polls} polls")]
    WaitTimedOut { job_id: String, polls: u32 },

    #[error("Wait for job {job_id} was cancelled")]
    Cancelled { job_id: String },

    #[error("Execution already exists: {name}")]
    ExecutionAlreadyExists { name: String },

    #[error("Execution not found: {name}")]
    ExecutionNotFound { name: String },

    #[error("Stored {key} but could not start its ingestion run: {message}")]
    IngestionNotStarted { key: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failures talking to object storage, the OCR engine or the workflow engine
#[derive(Error, Debug)]
pub enum ExternalServiceError {
    #[error("Storage {operation} failed for {bucket}/{key}")]
    Storage {
        operation: &'static str,
        bucket: String,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("OCR {operation} failed")]
    Ocr {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Workflow {operation} failed")]
    Workflow {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Connection failed to {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request to {url} failed (status {status}): {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Could not build request to {url}: {message}")]
    InvalidRequest { url: String, message: String },

    #[error("Invalid response from {url}")]
    InvalidResponse {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Local filesystem and rasterisation failures during image extraction
#[derive(Error, Debug)]
pub enum ScratchResourceError {
    #[error("Failed to create directory {path}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error")]
    Io(#[source] std::io::Error),

    #[error("Failed to render page {page}: {message}")]
    Render { page: u32, message: String },

    #[error("Failed to encode page {page}")]
    Encode {
        page: u32,
        #[source]
        source: image::ImageError,
    },

    #[error("PDF renderer unavailable: {message}")]
    RendererUnavailable { message: String },
}

/// API error response (matches Axum's built-in JsonRejection format)
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NoRecords
            | ServiceError::InvalidEvent { .. }
            | ServiceError::InvalidObjectKey { .. } => StatusCode::BAD_REQUEST,
            ServiceError::UnsupportedDocumentType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::ExecutionAlreadyExists { .. } => StatusCode::CONFLICT,
            ServiceError::ExecutionNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::External(_) | ServiceError::IngestionNotStarted { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::WaitTimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::NoRecords => "no_records",
            ServiceError::UnsupportedDocumentType { .. } => "unsupported_document_type",
            ServiceError::InvalidEvent { .. } => "invalid_event",
            ServiceError::InvalidObjectKey { .. } => "invalid_object_key",
            ServiceError::External(ExternalServiceError::Storage { .. }) => "storage_error",
            ServiceError::External(ExternalServiceError::Ocr { .. }) => "ocr_error",
            ServiceError::External(ExternalServiceError::Workflow { .. }) => "workflow_error",
            ServiceError::External(ExternalServiceError::Connection { .. }) => "connection_error",
            ServiceError::External(ExternalServiceError::Status { .. }) => "upstream_status",
            ServiceError::External(ExternalServiceError::InvalidRequest { .. }) => {
                "invalid_request"
            }
            ServiceError::External(ExternalServiceError::InvalidResponse { .. }) => {
                "invalid_response"
            }
            ServiceError::Scratch(_) => "scratch_resource_error",
            ServiceError::WaitTimedOut { .. } => "wait_timed_out",
            ServiceError::Cancelled { .. } => "cancelled",
            ServiceError::ExecutionAlreadyExists { .. } => "execution_already_exists",
            ServiceError::ExecutionNotFound { .. } => "execution_not_found",
            ServiceError::IngestionNotStarted { .. } => "ingestion_not_started",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: format_error_chain(&self),
            code: Some(code),
            details: None,
        };

        (status, Json(response)).into_response()
    }
}

impl From<std::io::Error> for ScratchResourceError {
    fn from(e: std::io::Error) -> Self {
        ScratchResourceError::Io(e)
    }
}

/// Render an error and every `source()` below it, outermost first.
pub fn format_error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        current = cause.source();
    }
    message
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
