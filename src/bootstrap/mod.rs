/*!
 * Bootstrap reconciliation.
 *
 * The dispatcher needs the workflow's identity and the workflow's roles need
 * capabilities on each other, so neither can be fully configured when it is
 * created. Two idempotent actions close that loop after everything exists:
 * - `grant`: attaches the start-run and invoke-task policies
 * - `env_injector`: writes the workflow id into the dispatcher's environment
 *
 * Both take a lifecycle request and return an outcome instead of an error, so
 * a caller can report the status of every action it ran.
 */

use log::error;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::errors::WorkflowError;

pub mod env_injector;
pub mod grant;
pub mod policy;

pub use env_injector::{EnvInjection, FunctionConfigStore, MemoryFunctionConfigStore, SqliteFunctionConfigStore};
pub use grant::PermissionGrant;
pub use policy::{AccessGuard, MemoryPolicyStore, PolicyDocument, PolicyStore, SqlitePolicyStore};

/// Lifecycle phase a reconciliation is run for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl std::str::FromStr for RequestType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "create" => Ok(RequestType::Create),
            "update" => Ok(RequestType::Update),
            "delete" => Ok(RequestType::Delete),
            _ => Err(anyhow::anyhow!("Invalid request type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Result of one reconciliation action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub status: OutcomeStatus,
    pub physical_resource_id: String,
    pub message: String,
}

impl ReconcileOutcome {
    pub fn success(physical_resource_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            physical_resource_id: physical_resource_id.into(),
            message: message.into(),
        }
    }

    pub fn failed(physical_resource_id: impl Into<String>, error: &WorkflowError) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            physical_resource_id: physical_resource_id.into(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Run one reconciliation under `timeout`, folding errors into a failed outcome
pub(crate) async fn reconcile_with_timeout<F>(
    action: &str,
    physical_resource_id: String,
    timeout: Duration,
    work: F,
) -> ReconcileOutcome
where
    F: Future<Output = Result<ReconcileOutcome, WorkflowError>>,
{
    let result = match tokio::time::timeout(timeout, work).await {
        Ok(result) => result,
        Err(_) => Err(WorkflowError::LeafTimeout {
            stage: action.to_string(),
            timeout_secs: timeout.as_secs(),
        }),
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            let e = match e {
                WorkflowError::ReconciliationFailure(_) => e,
                other => WorkflowError::ReconciliationFailure(other.to_string()),
            };
            error!("{} failed: {}", action, e);
            ReconcileOutcome::failed(physical_resource_id, &e)
        }
    }
}
