//! Workflow engines that sequence ingestion runs.
//!
//! The trigger only starts named executions; which engine runs them is a
//! deployment choice. [`LocalWorkflowEngine`] drives [`IngestionWorkflow`]
//! in-process, [`StepFunctionsClient`] hands the run to a remote engine that
//! calls the stage endpoints itself.

mod local;
mod state_machine;
mod step_functions;

pub use local::LocalWorkflowEngine;
pub use state_machine::{IngestionWorkflow, RunOutcome, RunReport};
pub use step_functions::StepFunctionsClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceResult;

/// Request to start one named execution
#[derive(Debug, Clone, PartialEq)]
pub struct StartExecution {
    pub state_machine_arn: String,
    pub name: String,
    /// JSON document handed to the first state
    pub input: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHandle {
    pub execution_arn: String,
    pub start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Aborted,
    PendingRedrive,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Succeeded => "SUCCEEDED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::TimedOut => "TIMED_OUT",
            ExecutionStatus::Aborted => "ABORTED",
            ExecutionStatus::PendingRedrive => "PENDING_REDRIVE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub execution_arn: String,
    pub name: String,
    pub status: ExecutionStatus,
    pub start_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_date: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Start a run. Names are unique per state machine; reusing one fails
    /// with `ExecutionAlreadyExists`.
    async fn start_execution(&self, request: &StartExecution) -> ServiceResult<ExecutionHandle>;

    /// Executions of a state machine, newest first.
    async fn list_executions(&self, state_machine_arn: &str)
    -> ServiceResult<Vec<ExecutionSummary>>;
}
