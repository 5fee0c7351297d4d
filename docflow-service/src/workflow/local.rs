//! In-process workflow engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use super::{
    ExecutionHandle, ExecutionStatus, ExecutionSummary, IngestionWorkflow, RunOutcome, RunReport,
    StartExecution, WorkflowEngine,
};
use crate::error::{ExternalServiceError, ServiceError, ServiceResult};
use crate::event::StorageEvent;

/// Longest execution name the engine accepts
const MAX_NAME_LEN: usize = 80;

struct ExecutionRecord {
    summary: ExecutionSummary,
    report: watch::Receiver<Option<Arc<RunReport>>>,
    cancel: CancellationToken,
}

/// Runs each execution on its own task and keeps a bounded history in memory.
pub struct LocalWorkflowEngine {
    state_machine_arn: String,
    workflow: Arc<IngestionWorkflow>,
    executions: Arc<DashMap<String, ExecutionRecord>>,
    retained: usize,
    shutdown: CancellationToken,
}

impl LocalWorkflowEngine {
    /// Once more than `retained` executions are recorded, the oldest
    /// finished ones are forgotten. Running executions are always kept.
    pub fn new(
        state_machine_arn: impl Into<String>,
        workflow: Arc<IngestionWorkflow>,
        retained: usize,
    ) -> Self {
        Self {
            state_machine_arn: state_machine_arn.into(),
            workflow,
            executions: Arc::new(DashMap::new()),
            retained: retained.max(1),
            shutdown: CancellationToken::new(),
        }
    }

    fn execution_arn(&self, name: &str) -> String {
        format!("{}:{}", self.state_machine_arn, name)
    }

    /// Wait for a named execution to finish and return its report.
    #[cfg(test)]
    pub async fn wait_for(&self, name: &str) -> Option<Arc<RunReport>> {
        let mut rx = self.executions.get(name)?.report.clone();
        let report = rx.wait_for(|report| report.is_some()).await.ok()?;
        report.clone()
    }

    pub fn summary(&self, name: &str) -> Option<ExecutionSummary> {
        self.executions.get(name).map(|r| r.summary.clone())
    }

    /// The report of a finished execution.
    pub fn report(&self, name: &str) -> Option<Arc<RunReport>> {
        self.executions
            .get(name)
            .and_then(|record| record.report.borrow().clone())
    }

    /// Abort one running execution.
    pub fn stop_execution(&self, name: &str) -> bool {
        match self.executions.get(name) {
            Some(record) if record.summary.status == ExecutionStatus::Running => {
                record.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Abort every running execution.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

fn validate_name(name: &str) -> ServiceResult<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_');
    if name.is_empty() || name.len() > MAX_NAME_LEN || !valid_chars {
        return Err(ServiceError::InvalidEvent {
            message: format!("invalid execution name {name:?}"),
        });
    }
    Ok(())
}

/// Drop the oldest finished records until at most `retained` remain.
fn evict_finished(executions: &DashMap<String, ExecutionRecord>, retained: usize) {
    let excess = executions.len().saturating_sub(retained);
    if excess == 0 {
        return;
    }

    let mut finished: Vec<(String, Option<DateTime<Utc>>)> = executions
        .iter()
        .filter(|record| record.summary.status != ExecutionStatus::Running)
        .map(|record| (record.key().clone(), record.summary.stop_date))
        .collect();
    finished.sort_by_key(|(_, stop_date)| *stop_date);

    for (name, _) in finished.into_iter().take(excess) {
        executions.remove(&name);
        debug!(execution = %name, "Evicted finished execution");
    }
}

fn status_for(outcome: RunOutcome) -> ExecutionStatus {
    match outcome {
        RunOutcome::Succeeded => ExecutionStatus::Succeeded,
        RunOutcome::Failed => ExecutionStatus::Failed,
        RunOutcome::TimedOut => ExecutionStatus::TimedOut,
        RunOutcome::Aborted => ExecutionStatus::Aborted,
    }
}

#[async_trait]
impl WorkflowEngine for LocalWorkflowEngine {
    async fn start_execution(&self, request: &StartExecution) -> ServiceResult<ExecutionHandle> {
        if request.state_machine_arn != self.state_machine_arn {
            return Err(ServiceError::External(ExternalServiceError::Workflow {
                operation: "start_execution",
                source: format!("state machine does not exist: {}", request.state_machine_arn)
                    .into(),
            }));
        }
        validate_name(&request.name)?;
        let event: StorageEvent =
            serde_json::from_str(&request.input).map_err(|e| ServiceError::InvalidEvent {
                message: format!("execution input is not a storage event: {e}"),
            })?;

        let start_date = Utc::now();
        let execution_arn = self.execution_arn(&request.name);
        let cancel = self.shutdown.child_token();
        let (tx, rx) = watch::channel(None);

        match self.executions.entry(request.name.clone()) {
            Entry::Occupied(_) => {
                return Err(ServiceError::ExecutionAlreadyExists {
                    name: request.name.clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(ExecutionRecord {
                    summary: ExecutionSummary {
                        execution_arn: execution_arn.clone(),
                        name: request.name.clone(),
                        status: ExecutionStatus::Running,
                        start_date,
                        stop_date: None,
                    },
                    report: rx,
                    cancel: cancel.clone(),
                });
            }
        }

        let name = request.name.clone();
        let workflow = self.workflow.clone();
        let executions = self.executions.clone();
        let retained = self.retained;
        let span = info_span!("execution", execution = %name);

        tokio::spawn(
            async move {
                let report = workflow.run(event, &cancel).await;
                let status = status_for(report.outcome);
                if status == ExecutionStatus::Succeeded {
                    info!("Execution succeeded");
                } else {
                    warn!(status = status.as_str(), error = ?report.error, "Execution did not succeed");
                }

                if let Some(mut record) = executions.get_mut(&name) {
                    record.summary.status = status;
                    record.summary.stop_date = Some(Utc::now());
                }
                evict_finished(&executions, retained);
                // Receivers may all be gone; the record above is the durable copy
                let _ = tx.send(Some(Arc::new(report)));
            }
            .instrument(span),
        );

        info!(execution = %request.name, "Execution started");
        Ok(ExecutionHandle {
            execution_arn,
            start_date,
        })
    }

    async fn list_executions(
        &self,
        state_machine_arn: &str,
    ) -> ServiceResult<Vec<ExecutionSummary>> {
        if state_machine_arn != self.state_machine_arn {
            return Ok(Vec::new());
        }

        let mut executions: Vec<ExecutionSummary> = self
            .executions
            .iter()
            .map(|record| record.summary.clone())
            .collect();
        executions.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(executions)
    }
}
