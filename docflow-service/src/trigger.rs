//! Orchestration trigger: turns a storage notification into a named
//! workflow execution.
//!
//! Unlike the stages, the trigger never propagates a failure. It is the
//! pipeline's entry point, so errors come back as a `statusCode: 500`
//! envelope carrying the error chain.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::event::{HandlerResponse, StorageEvent};
use crate::workflow::{ExecutionHandle, StartExecution, WorkflowEngine};

pub const INVOKED: &str = "Invoked orchestrator";
pub const NOTHING_TO_INDEX: &str = "Nothing to index";

/// Segments before this index are the storage layout, not the file's identity
const NAME_FIRST_SEGMENT: usize = 3;

/// Longest key-derived part of an execution name
const NAME_MAX_CHARS: usize = 68;

pub struct OrchestrationTrigger {
    engine: Arc<dyn WorkflowEngine>,
    state_machine_arn: String,
}

impl OrchestrationTrigger {
    pub fn new(engine: Arc<dyn WorkflowEngine>, state_machine_arn: impl Into<String>) -> Self {
        Self {
            engine,
            state_machine_arn: state_machine_arn.into(),
        }
    }

    /// Handle a raw notification, answering with the stage envelope.
    pub async fn handle(&self, raw: &Value) -> HandlerResponse<String> {
        match self.start(raw).await {
            Ok(Some(handle)) => {
                info!(execution_arn = %handle.execution_arn, "Invoked orchestrator");
                HandlerResponse::ok(INVOKED.to_string())
            }
            Ok(None) => {
                info!("Notification carried no records");
                HandlerResponse::ok(NOTHING_TO_INDEX.to_string())
            }
            Err(e) => {
                let chain = format_error_chain(&e);
                error!(error = %chain, "Failed to start orchestration");
                metrics::counter!("docflow_stage_failures_total", "stage" => "trigger")
                    .increment(1);
                HandlerResponse::internal_error(chain)
            }
        }
    }

    /// Start an execution for the first record, or `None` for an empty batch.
    pub async fn start(&self, raw: &Value) -> ServiceResult<Option<ExecutionHandle>> {
        let event: StorageEvent =
            serde_json::from_value(raw.clone()).map_err(|e| ServiceError::InvalidEvent {
                message: e.to_string(),
            })?;
        if !event.has_records() {
            return Ok(None);
        }

        let object_key = event.first_record()?.decoded_key()?;
        let name = execution_name(&object_key, chrono::Utc::now().timestamp());
        let input = serde_json::to_string(raw).map_err(|e| ServiceError::Internal {
            message: format!("failed to serialize execution input: {e}"),
        })?;

        info!(object_key = %object_key, execution = %name, "Starting execution");
        let handle = self
            .engine
            .start_execution(&StartExecution {
                state_machine_arn: self.state_machine_arn.clone(),
                name,
                input,
            })
            .await?;

        metrics::counter!("docflow_runs_started_total").increment(1);
        Ok(Some(handle))
    }
}

/// `<sanitized file identity>-<unix seconds>`.
///
/// The identity is every key segment from the fourth onward, concatenated
/// and cut to [`NAME_MAX_CHARS`] characters.
pub fn execution_name(object_key: &str, timestamp: i64) -> String {
    let identity: String = object_key
        .split('/')
        .skip(NAME_FIRST_SEGMENT)
        .collect::<String>()
        .chars()
        .take(NAME_MAX_CHARS)
        .collect();

    format!("{}-{}", sanitize_run_name(&identity), timestamp)
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_run_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
