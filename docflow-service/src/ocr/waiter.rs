use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{AnalysisStatus, OcrService};
use crate::error::{ServiceError, ServiceResult, format_error_chain};

/// Polls a job until it reaches a terminal status.
///
/// The wait is bounded only if `max_polls` is set; otherwise the caller
/// ends it by cancelling the token (the local workflow engine does this on
/// step timeout). Nothing is held across the sleep, so an abandoned wait
/// leaves no state behind.
pub struct OcrJobWaiter {
    ocr: Arc<dyn OcrService>,
    poll_interval: Duration,
    max_polls: Option<u32>,
}

impl OcrJobWaiter {
    pub fn new(ocr: Arc<dyn OcrService>, poll_interval: Duration, max_polls: Option<u32>) -> Self {
        Self {
            ocr,
            poll_interval,
            max_polls,
        }
    }

    /// Return the first non-`IN_PROGRESS` status payload, unmodified.
    pub async fn wait(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<AnalysisStatus> {
        self.wait_inner(job_id, cancel).await.inspect_err(|e| {
            error!(job_id, error = %format_error_chain(e), "Waiting for OCR job failed");
            metrics::counter!("docflow_stage_failures_total", "stage" => "wait_ocr").increment(1);
        })
    }

    async fn wait_inner(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> ServiceResult<AnalysisStatus> {
        info!(job_id, "Waiting for OCR job");
        let mut polls: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled {
                    job_id: job_id.to_string(),
                });
            }

            let status = self.ocr.get_document_analysis(job_id).await?;
            polls += 1;
            metrics::counter!("docflow_ocr_polls_total").increment(1);

            let job_status = status.job_status();
            if job_status.is_terminal() {
                info!(
                    job_id,
                    polls,
                    status = status.job_status_str().unwrap_or("<missing>"),
                    "OCR job ended"
                );
                return Ok(status);
            }

            info!(job_id, polls, "OCR job in progress");

            if self.max_polls.is_some_and(|max| polls >= max) {
                return Err(ServiceError::WaitTimedOut {
                    job_id: job_id.to_string(),
                    polls,
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(ServiceError::Cancelled {
                        job_id: job_id.to_string(),
                    });
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
