//! The ingestion state machine.
//!
//! ```text
//! Classify ──removed──────────────────────────────▶ Done
//! Classify ──pdf──▶ ExtractImages ──▶ LaunchOcr ──▶ WaitOcr ──▶ Done
//! Classify ──text─────────────────▶ LaunchOcr
//! any error ──▶ Failed
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::classifier;
use crate::error::{ServiceError, format_error_chain};
use crate::event::{IngestionEvent, StorageEvent};
use crate::images::ImageExtractor;
use crate::ocr::{OcrJobLauncher, OcrJobWaiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Classify,
    ExtractImages,
    LaunchOcr,
    WaitOcr,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
}

impl RunOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Succeeded => "succeeded",
            RunOutcome::Failed => "failed",
            RunOutcome::TimedOut => "timed_out",
            RunOutcome::Aborted => "aborted",
        }
    }
}

/// What one run did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Absent only when the input could not be read as a storage event
    pub event: Option<IngestionEvent>,
    /// Pages uploaded when images were extracted. The keys themselves live
    /// only in object storage.
    pub page_count: Option<usize>,
    pub states: Vec<RunState>,
    pub error: Option<String>,
}

enum StepFailure {
    Error(ServiceError),
    TimedOut,
    Aborted,
}

/// Sequences the stages for one storage event.
pub struct IngestionWorkflow {
    launcher: Arc<OcrJobLauncher>,
    waiter: Arc<OcrJobWaiter>,
    extractor: Arc<ImageExtractor>,
    step_timeout: Duration,
}

struct Run {
    states: Vec<RunState>,
    event: Option<IngestionEvent>,
    page_count: Option<usize>,
}

impl Run {
    fn enter(&mut self, state: RunState) {
        info!(state = ?state, "Entering state");
        self.states.push(state);
    }

    fn finish(mut self, outcome: RunOutcome, error: Option<String>) -> RunReport {
        self.states.push(match outcome {
            RunOutcome::Succeeded => RunState::Done,
            _ => RunState::Failed,
        });
        metrics::counter!("docflow_runs_finished_total", "status" => outcome.as_str())
            .increment(1);

        RunReport {
            outcome,
            event: self.event,
            page_count: self.page_count,
            states: self.states,
            error,
        }
    }

    fn fail(self, failure: StepFailure) -> RunReport {
        match failure {
            StepFailure::Error(e) => {
                let chain = format_error_chain(&e);
                self.finish(RunOutcome::Failed, Some(chain))
            }
            StepFailure::TimedOut => {
                let state = self.states.last().copied();
                warn!(state = ?state, "Step timed out");
                self.finish(RunOutcome::TimedOut, Some("step timed out".to_string()))
            }
            StepFailure::Aborted => self.finish(RunOutcome::Aborted, Some("aborted".to_string())),
        }
    }
}

impl IngestionWorkflow {
    pub fn new(
        launcher: Arc<OcrJobLauncher>,
        waiter: Arc<OcrJobWaiter>,
        extractor: Arc<ImageExtractor>,
        step_timeout: Duration,
    ) -> Self {
        Self {
            launcher,
            waiter,
            extractor,
            step_timeout,
        }
    }

    /// Run every state for `event` until `Done` or `Failed`.
    ///
    /// Cancelling `cancel` aborts the current step.
    pub async fn run(&self, event: StorageEvent, cancel: &CancellationToken) -> RunReport {
        let mut run = Run {
            states: Vec::new(),
            event: None,
            page_count: None,
        };

        run.enter(RunState::Classify);
        let classified = match classifier::classify(event) {
            Ok(classified) => classified,
            Err(e) => return run.fail(StepFailure::Error(e)),
        };
        let mut ingestion = match IngestionEvent::from_storage_event(&classified) {
            Ok(ingestion) => ingestion,
            Err(e) => return run.fail(StepFailure::Error(e)),
        };
        let removal = ingestion.is_removal();
        let has_images = ingestion.document_type.is_some_and(|d| d.has_images());
        let (bucket, object_key) = (ingestion.bucket.clone(), ingestion.object_key.clone());
        run.event = Some(ingestion.clone());

        if removal {
            info!(object_key = %object_key, "Removed object, nothing to ingest");
            return run.finish(RunOutcome::Succeeded, None);
        }

        if has_images {
            run.enter(RunState::ExtractImages);
            match self
                .step(cancel, self.extractor.extract(&bucket, &object_key))
                .await
            {
                Ok(pages) => run.page_count = Some(pages.len()),
                Err(failure) => return run.fail(failure),
            }
        }

        run.enter(RunState::LaunchOcr);
        let job = match self
            .step(cancel, self.launcher.launch(&bucket, &object_key))
            .await
        {
            Ok(job) => job,
            Err(failure) => return run.fail(failure),
        };
        ingestion.job_id = Some(job.job_id.clone());
        run.event = Some(ingestion.clone());

        run.enter(RunState::WaitOcr);
        let status = match self.step(cancel, self.waiter.wait(&job.job_id, cancel)).await {
            Ok(status) => status,
            Err(failure) => return run.fail(failure),
        };
        ingestion.job_status = status.job_status_str().map(str::to_string);
        run.event = Some(ingestion);

        run.finish(RunOutcome::Succeeded, None)
    }

    /// Drive one step under the step timeout; dropping the future abandons it.
    async fn step<T>(
        &self,
        cancel: &CancellationToken,
        fut: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, StepFailure> {
        tokio::select! {
            result = fut => result.map_err(|e| match e {
                ServiceError::Cancelled { .. } => StepFailure::Aborted,
                other => StepFailure::Error(other),
            }),
            _ = tokio::time::sleep(self.step_timeout) => Err(StepFailure::TimedOut),
            _ = cancel.cancelled() => Err(StepFailure::Aborted),
        }
    }
}
