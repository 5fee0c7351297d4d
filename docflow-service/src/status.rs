//! Indexing status lookup for the front end.

use crate::error::ServiceResult;
use crate::workflow::{ExecutionSummary, WorkflowEngine};

/// The most recent run whose name starts with `user`, or the most recent
/// run overall when no user is given.
pub async fn latest_run(
    engine: &dyn WorkflowEngine,
    state_machine_arn: &str,
    user: Option<&str>,
) -> ServiceResult<Option<ExecutionSummary>> {
    let executions = engine.list_executions(state_machine_arn).await?;

    Ok(executions
        .into_iter()
        .filter(|execution| user.is_none_or(|user| execution.name.starts_with(user)))
        .max_by_key(|execution| execution.start_date))
}
