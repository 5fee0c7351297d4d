use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::{AnalysisRequest, OcrService};
use crate::error::{ServiceResult, format_error_chain};
use crate::paths::ObjectKeyPath;

/// Handle of a submitted OCR job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LaunchedJob {
    pub job_id: String,
    pub output_prefix: String,
}

/// Submits table-extraction jobs without waiting for them.
///
/// No retries happen here; a failed submission is returned to whoever
/// sequences the run.
pub struct OcrJobLauncher {
    ocr: Arc<dyn OcrService>,
    feature_types: Vec<String>,
}

impl OcrJobLauncher {
    pub fn new(ocr: Arc<dyn OcrService>, feature_types: Vec<String>) -> Self {
        Self { ocr, feature_types }
    }

    pub async fn launch(&self, bucket: &str, object_key: &str) -> ServiceResult<LaunchedJob> {
        self.launch_inner(bucket, object_key).await.inspect_err(|e| {
            error!(
                bucket,
                object_key,
                error = %format_error_chain(e),
                "Failed to start OCR job"
            );
            metrics::counter!("docflow_stage_failures_total", "stage" => "launch_ocr").increment(1);
        })
    }

    async fn launch_inner(&self, bucket: &str, object_key: &str) -> ServiceResult<LaunchedJob> {
        let path = ObjectKeyPath::parse(object_key)?;
        let output_prefix = path.ocr_output_prefix();
        info!(bucket, object_key, output_prefix = %output_prefix, "Starting OCR job");

        let request = AnalysisRequest {
            bucket: bucket.to_string(),
            object_key: object_key.to_string(),
            feature_types: self.feature_types.clone(),
            output_bucket: bucket.to_string(),
            output_prefix: output_prefix.clone(),
        };
        let job_id = self.ocr.start_document_analysis(&request).await?;

        info!(job_id = %job_id, object_key, "OCR job started");
        metrics::counter!("docflow_ocr_jobs_started_total").increment(1);

        Ok(LaunchedJob {
            job_id,
            output_prefix,
        })
    }
}
