//! Asynchronous OCR (document analysis) jobs.
//!
//! The launcher submits a job and returns its handle; the waiter polls the
//! handle until the job leaves `IN_PROGRESS`. [`analyze`] chains the two for
//! a classified storage event.

mod launcher;
mod textract;
mod waiter;

pub use launcher::{LaunchedJob, OcrJobLauncher};
pub use textract::TextractClient;
pub use waiter::OcrJobWaiter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ServiceResult;
use crate::event::{IngestionEvent, StorageEvent};

/// What to analyse and where the engine should write its results
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub bucket: String,
    pub object_key: String,
    pub feature_types: Vec<String>,
    pub output_bucket: String,
    pub output_prefix: String,
}

#[async_trait]
pub trait OcrService: Send + Sync {
    /// Submit an asynchronous analysis job and return its id.
    async fn start_document_analysis(&self, request: &AnalysisRequest) -> ServiceResult<String>;

    /// Fetch the current status payload of a job.
    async fn get_document_analysis(&self, job_id: &str) -> ServiceResult<AnalysisStatus>;
}

/// Lifecycle state reported for a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    PartialSuccess,
    Other(String),
}

impl JobStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "IN_PROGRESS" => JobStatus::InProgress,
            "SUCCEEDED" => JobStatus::Succeeded,
            "FAILED" => JobStatus::Failed,
            "PARTIAL_SUCCESS" => JobStatus::PartialSuccess,
            other => JobStatus::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::InProgress)
    }
}

/// Raw status payload of a job, kept exactly as the engine returned it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisStatus(Map<String, Value>);

impl AnalysisStatus {
    /// The `JobStatus` field as sent, if present.
    pub fn job_status_str(&self) -> Option<&str> {
        self.0.get("JobStatus").and_then(Value::as_str)
    }

    pub fn job_status(&self) -> JobStatus {
        match self.job_status_str() {
            Some(status) => JobStatus::parse(status),
            None => JobStatus::Other(String::new()),
        }
    }
}

/// Outcome of the combined launch-and-wait stage.
///
/// Every field is null when the event was a removal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrResults {
    pub bucket_name: Option<String>,
    pub event_type: Option<String>,
    pub job_id: Option<String>,
    pub job_status: Option<String>,
    pub object_key: Option<String>,
}

/// Launch an OCR job for the event's object and wait for it to finish.
pub async fn analyze(
    launcher: &OcrJobLauncher,
    waiter: &OcrJobWaiter,
    event: &StorageEvent,
    cancel: &CancellationToken,
) -> ServiceResult<OcrResults> {
    let ingestion = IngestionEvent::from_storage_event(event)?;
    if ingestion.is_removal() {
        info!(object_key = %ingestion.object_key, "Skipping OCR for removed object");
        return Ok(OcrResults::default());
    }

    let launched = launcher
        .launch(&ingestion.bucket, &ingestion.object_key)
        .await?;
    let status = waiter.wait(&launched.job_id, cancel).await?;

    Ok(OcrResults {
        bucket_name: Some(ingestion.bucket),
        event_type: Some(ingestion.event_name),
        job_id: Some(launched.job_id),
        job_status: status.job_status_str().map(str::to_string),
        object_key: Some(ingestion.object_key),
    })
}
