/*!
 * Run-start interface.
 *
 * Starting a run only hands the input to the workflow and returns a handle;
 * the run itself proceeds independently of the caller.
 */

use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::coordinator::WorkflowCoordinator;
use super::document::{CombinedDocument, RunInput};
use crate::bootstrap::policy::{AccessGuard, START_RUN_ACTION};
use crate::errors::WorkflowError;

/// Identifies a started run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHandle {
    pub workflow_id: String,
    pub run_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub workflow_id: String,
    pub input: RunInput,
}

/// Starts workflow runs
#[async_trait]
pub trait RunStarter: Send + Sync + Debug {
    async fn start(&self, request: StartRunRequest) -> Result<RunHandle, WorkflowError>;
}

type RunTask = JoinHandle<Result<CombinedDocument, WorkflowError>>;

/// Runs the coordinator on Tokio tasks in this process
///
/// Every started run keeps its join handle until `wait` or `wait_all` takes
/// it, so long-lived callers must drain finished runs.
#[derive(Debug, Clone)]
pub struct LocalRunStarter {
    workflow_id: String,
    coordinator: Arc<WorkflowCoordinator>,
    caller: Option<AccessGuard>,
    tasks: Arc<Mutex<HashMap<String, RunTask>>>,
}

impl LocalRunStarter {
    pub fn new(workflow_id: impl Into<String>, coordinator: Arc<WorkflowCoordinator>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            coordinator,
            caller: None,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Require the caller to hold `workflow:StartRun` on this workflow
    pub fn with_caller(mut self, caller: AccessGuard) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Runs started and not yet collected by `wait` or `wait_all`
    pub fn pending_runs(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for one run to finish
    pub async fn wait(&self, handle: &RunHandle) -> Result<CombinedDocument, WorkflowError> {
        let task = self.tasks.lock().remove(&handle.run_id).ok_or_else(|| {
            WorkflowError::RunStartFailure(format!("No run {} in this process", handle.run_id))
        })?;

        task.await
            .map_err(|e| WorkflowError::RunStartFailure(format!("Run {} aborted: {}", handle.run_id, e)))?
    }

    /// Wait for every run started so far, in no particular order
    pub async fn wait_all(&self) -> Vec<(String, Result<CombinedDocument, WorkflowError>)> {
        let tasks: Vec<(String, RunTask)> = self.tasks.lock().drain().collect();

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (run_id, task) in tasks {
            let outcome = task
                .await
                .map_err(|e| WorkflowError::RunStartFailure(format!("Run {} aborted: {}", run_id, e)))
                .and_then(|result| result);
            outcomes.push((run_id, outcome));
        }
        outcomes
    }
}

#[async_trait]
impl RunStarter for LocalRunStarter {
    async fn start(&self, request: StartRunRequest) -> Result<RunHandle, WorkflowError> {
        if request.workflow_id != self.workflow_id {
            return Err(WorkflowError::RunStartFailure(format!(
                "Workflow '{}' does not exist",
                request.workflow_id
            )));
        }

        if let Some(caller) = &self.caller {
            caller
                .check(START_RUN_ACTION, &self.workflow_id)
                .await
                .map_err(|e| WorkflowError::RunStartFailure(e.to_string()))?;
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let coordinator = self.coordinator.clone();
        let input = request.input;
        let task_run_id = run_id.clone();
        let task = tokio::spawn(async move { coordinator.run(&task_run_id, &input).await });
        self.tasks.lock().insert(run_id.clone(), task);

        info!("Started run {} of workflow '{}'", run_id, self.workflow_id);
        Ok(RunHandle {
            workflow_id: self.workflow_id.clone(),
            run_id,
        })
    }
}
