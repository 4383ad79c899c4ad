/*!
 * Permission grant between the dispatcher and the workflow.
 *
 * Create/Update attach two policies:
 * - `DispatcherStartWorkflowPolicy` on the dispatcher role: start runs of the workflow
 * - `CoordinatorInvokeTaskPolicy` on the coordinator role: invoke every target task
 *
 * Delete removes exactly those two policies. A policy that is already gone
 * counts as removed.
 */

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::policy::{role_name, PolicyDocument, PolicyStore, INVOKE_TASK_ACTION, START_RUN_ACTION};
use super::{reconcile_with_timeout, ReconcileOutcome, RequestType};
use crate::errors::WorkflowError;

pub const DISPATCHER_POLICY_NAME: &str = "DispatcherStartWorkflowPolicy";
pub const COORDINATOR_POLICY_NAME: &str = "CoordinatorInvokeTaskPolicy";

/// Inputs of the grant action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantProperties {
    pub dispatcher_role_id: Option<String>,
    pub coordinator_role_id: Option<String>,
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub target_tasks: Vec<String>,
}

impl GrantProperties {
    pub fn physical_resource_id(&self) -> String {
        format!(
            "{}-{}-perms",
            self.dispatcher_role_id.as_deref().unwrap_or_default(),
            self.coordinator_role_id.as_deref().unwrap_or_default()
        )
    }
}

#[derive(Debug, Clone)]
pub struct PermissionGrant {
    store: Arc<dyn PolicyStore>,
    timeout: Duration,
}

impl PermissionGrant {
    pub fn new(store: Arc<dyn PolicyStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn reconcile(&self, request: RequestType, properties: &GrantProperties) -> ReconcileOutcome {
        let physical_id = properties.physical_resource_id();
        let work = async {
            match request {
                RequestType::Create | RequestType::Update => self.apply(properties, &physical_id).await,
                RequestType::Delete => Ok(self.remove(properties, &physical_id).await),
            }
        };

        reconcile_with_timeout("Permission grant", physical_id.clone(), self.timeout, work).await
    }

    async fn apply(&self, properties: &GrantProperties, physical_id: &str) -> Result<ReconcileOutcome, WorkflowError> {
        let dispatcher_role = properties.dispatcher_role_id.as_deref().and_then(role_name);
        let coordinator_role = properties.coordinator_role_id.as_deref().and_then(role_name);
        let workflow_id = properties.workflow_id.as_deref().filter(|id| !id.is_empty());

        let (Some(dispatcher_role), Some(coordinator_role), Some(workflow_id)) =
            (dispatcher_role, coordinator_role, workflow_id)
        else {
            return Err(WorkflowError::ReconciliationFailure(
                "Missing required properties for Create/Update request".to_string(),
            ));
        };
        if properties.target_tasks.is_empty() {
            return Err(WorkflowError::ReconciliationFailure(
                "At least one target task is required".to_string(),
            ));
        }

        let start_run = PolicyDocument::allow(START_RUN_ACTION, [workflow_id]);
        self.store
            .put_policy(dispatcher_role, DISPATCHER_POLICY_NAME, &start_run)
            .await
            .map_err(|e| WorkflowError::ReconciliationFailure(format!("{:#}", e)))?;
        info!("Applied {} to {}", DISPATCHER_POLICY_NAME, dispatcher_role);

        let invoke = PolicyDocument::allow(INVOKE_TASK_ACTION, properties.target_tasks.iter().cloned());
        self.store
            .put_policy(coordinator_role, COORDINATOR_POLICY_NAME, &invoke)
            .await
            .map_err(|e| WorkflowError::ReconciliationFailure(format!("{:#}", e)))?;
        info!("Applied {} to {}", COORDINATOR_POLICY_NAME, coordinator_role);

        Ok(ReconcileOutcome::success(physical_id, "Permissions granted successfully."))
    }

    async fn remove(&self, properties: &GrantProperties, physical_id: &str) -> ReconcileOutcome {
        let dispatcher_role = properties.dispatcher_role_id.as_deref().and_then(role_name);
        let coordinator_role = properties.coordinator_role_id.as_deref().and_then(role_name);

        let (Some(dispatcher_role), Some(coordinator_role)) = (dispatcher_role, coordinator_role) else {
            warn!("Role names not found, skipping policy deletion");
            return ReconcileOutcome::success(physical_id, "Skipping delete as role names are missing.");
        };

        for (role, policy) in [
            (dispatcher_role, DISPATCHER_POLICY_NAME),
            (coordinator_role, COORDINATOR_POLICY_NAME),
        ] {
            match self.store.delete_policy(role, policy).await {
                Ok(true) => info!("Deleted {} from {}", policy, role),
                Ok(false) => info!("Policy {} not found on {}, skipping deletion", policy, role),
                Err(e) => error!("Error deleting {} from {}: {:#}", policy, role, e),
            }
        }

        ReconcileOutcome::success(physical_id, "Delete policies attempted.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::policy::{is_allowed, MemoryPolicyStore};
    use crate::bootstrap::OutcomeStatus;

    fn properties() -> GrantProperties {
        GrantProperties {
            dispatcher_role_id: Some("roles/dispatcher".to_string()),
            coordinator_role_id: Some("roles/coordinator".to_string()),
            workflow_id: Some("workflow/translate".to_string()),
            target_tasks: vec!["validator".to_string(), "translator".to_string(), "combiner".to_string()],
        }
    }

    fn grant(store: &MemoryPolicyStore) -> PermissionGrant {
        PermissionGrant::new(Arc::new(store.clone()), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_create_shouldAttachBothPolicies() {
        let store = MemoryPolicyStore::new();

        let outcome = grant(&store).reconcile(RequestType::Create, &properties()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.physical_resource_id, "roles/dispatcher-roles/coordinator-perms");
        assert!(is_allowed(&store, "dispatcher", START_RUN_ACTION, "workflow/translate").await.unwrap());
        assert!(is_allowed(&store, "coordinator", INVOKE_TASK_ACTION, "combiner").await.unwrap());
    }

    #[tokio::test]
    async fn test_createTwice_shouldKeepOnePolicyPerName() {
        let store = MemoryPolicyStore::new();
        let grant = grant(&store);

        grant.reconcile(RequestType::Create, &properties()).await;
        grant.reconcile(RequestType::Update, &properties()).await;

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_create_withMissingWorkflow_shouldFail() {
        let store = MemoryPolicyStore::new();
        let mut props = properties();
        props.workflow_id = None;

        let outcome = grant(&store).reconcile(RequestType::Create, &props).await;

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delete_withAbsentPolicies_shouldSucceed() {
        let store = MemoryPolicyStore::new();

        let outcome = grant(&store).reconcile(RequestType::Delete, &properties()).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.message, "Delete policies attempted.");
    }

    #[tokio::test]
    async fn test_delete_withoutRoles_shouldSkip() {
        let outcome = grant(&MemoryPolicyStore::new())
            .reconcile(RequestType::Delete, &GrantProperties::default())
            .await;

        assert!(outcome.is_success());
        assert!(outcome.message.contains("Skipping"));
    }

    #[tokio::test]
    async fn test_delete_shouldRemoveOnlyGrantedPolicies() {
        let store = MemoryPolicyStore::new();
        store
            .put_policy("dispatcher", "Unrelated", &PolicyDocument::allow("x:Y", ["*"]))
            .await
            .unwrap();
        let grant = grant(&store);
        grant.reconcile(RequestType::Create, &properties()).await;

        grant.reconcile(RequestType::Delete, &properties()).await;

        assert_eq!(store.len(), 1);
        assert!(store.get_policy("dispatcher", "Unrelated").await.unwrap().is_some());
    }
}
