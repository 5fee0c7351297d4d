//! Step Functions compatible workflow client (AWS JSON 1.0).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExecutionHandle, ExecutionStatus, ExecutionSummary, StartExecution, WorkflowEngine};
use crate::aws::{self, AwsJsonClient, JsonProtocol, RequestSigner};
use crate::config::AwsConfig;
use crate::error::{ExternalServiceError, ServiceError, ServiceResult};

const START_TARGET: &str = "AWSStepFunctions.StartExecution";
const LIST_TARGET: &str = "AWSStepFunctions.ListExecutions";
const LIST_PAGE_SIZE: u32 = 100;

const SIGNING_NAME: &str = "states";

pub struct StepFunctionsClient {
    client: AwsJsonClient,
}

impl StepFunctionsClient {
    pub fn new(endpoint: &str, timeout_secs: u64, aws: &AwsConfig) -> ServiceResult<Self> {
        let client = AwsJsonClient::new(
            endpoint,
            timeout_secs,
            JsonProtocol::V1_0,
            RequestSigner::from_config(aws, SIGNING_NAME),
        )?;

        Ok(Self { client })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartExecutionInput<'a> {
    state_machine_arn: &'a str,
    name: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartExecutionOutput {
    execution_arn: String,
    start_date: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListExecutionsInput<'a> {
    state_machine_arn: &'a str,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListExecutionsOutput {
    #[serde(default)]
    executions: Vec<ExecutionListItem>,
    #[serde(default)]
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionListItem {
    execution_arn: String,
    name: String,
    status: ExecutionStatus,
    start_date: f64,
    #[serde(default)]
    stop_date: Option<f64>,
}

/// Dates on the wire are fractional epoch seconds.
fn from_epoch_seconds(seconds: f64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64).unwrap_or_default()
}

impl From<ExecutionListItem> for ExecutionSummary {
    fn from(item: ExecutionListItem) -> Self {
        ExecutionSummary {
            execution_arn: item.execution_arn,
            name: item.name,
            status: item.status,
            start_date: from_epoch_seconds(item.start_date),
            stop_date: item.stop_date.map(from_epoch_seconds),
        }
    }
}

fn workflow_error(operation: &'static str, source: ExternalServiceError) -> ServiceError {
    ServiceError::External(ExternalServiceError::Workflow {
        operation,
        source: Box::new(source),
    })
}

#[async_trait]
impl WorkflowEngine for StepFunctionsClient {
    async fn start_execution(&self, request: &StartExecution) -> ServiceResult<ExecutionHandle> {
        let input = StartExecutionInput {
            state_machine_arn: &request.state_machine_arn,
            name: &request.name,
            input: &request.input,
        };

        let output: StartExecutionOutput = self
            .client
            .call(START_TARGET, &input)
            .await
        .map_err(|e| {
            if aws::is_error_type(&e, "ExecutionAlreadyExists") {
                ServiceError::ExecutionAlreadyExists {
                    name: request.name.clone(),
                }
            } else {
                workflow_error("start_execution", e)
            }
        })?;

        Ok(ExecutionHandle {
            execution_arn: output.execution_arn,
            start_date: from_epoch_seconds(output.start_date),
        })
    }

    async fn list_executions(
        &self,
        state_machine_arn: &str,
    ) -> ServiceResult<Vec<ExecutionSummary>> {
        let mut executions = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let input = ListExecutionsInput {
                state_machine_arn,
                max_results: LIST_PAGE_SIZE,
                next_token: next_token.as_deref(),
            };
            let page: ListExecutionsOutput = self
            .client
            .call(LIST_TARGET, &input)
            .await
            .map_err(|e| workflow_error("list_executions", e))?;

            executions.extend(page.executions.into_iter().map(ExecutionSummary::from));
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }

        Ok(executions)
    }
}
