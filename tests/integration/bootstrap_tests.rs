/*!
 * Bootstrap reconciliation against SQLite-backed policy and function stores
 */

use std::sync::Arc;

use docflow::app_config::Config;
use docflow::app_controller::{Controller, Services};
use docflow::bootstrap::grant::{COORDINATOR_POLICY_NAME, DISPATCHER_POLICY_NAME};
use docflow::bootstrap::policy::{is_allowed, INVOKE_TASK_ACTION, START_RUN_ACTION};
use docflow::bootstrap::{
    FunctionConfigStore, OutcomeStatus, PolicyStore, RequestType, SqliteFunctionConfigStore, SqlitePolicyStore,
};
use docflow::database::Repository;
use docflow::workflow::coordinator::{LEAF_TASKS, TRANSLATOR_TASK};
use docflow::workflow::dispatcher::{DISPATCHER_FUNCTION, WORKFLOW_ID_VAR};

use crate::common::MockServices;

struct SqliteFixture {
    controller: Controller,
    policies: SqlitePolicyStore,
    functions: SqliteFunctionConfigStore,
}

fn sqlite_fixture(config: Config) -> SqliteFixture {
    let repository = Repository::new_in_memory().unwrap();
    let policies = SqlitePolicyStore::new(repository.clone());
    let functions = SqliteFunctionConfigStore::new(repository);

    let mocks = MockServices::new(docflow::providers::mock::MockGeneration::working());
    let services = Services {
        policies: Arc::new(policies.clone()),
        functions: Arc::new(functions.clone()),
        ..mocks.services()
    };

    SqliteFixture {
        controller: Controller::with_services(config, services),
        policies,
        functions,
    }
}

#[tokio::test]
async fn test_grant_create_shouldAllowStartRunAndEveryLeafTask() {
    let fixture = sqlite_fixture(Config::default());

    let outcome = fixture.controller.grant(RequestType::Create).await;

    assert_eq!(outcome.status, OutcomeStatus::Success);
    assert_eq!(
        outcome.physical_resource_id,
        "roles/upload-dispatcher-roles/workflow-coordinator-perms"
    );
    assert!(is_allowed(&fixture.policies, "upload-dispatcher", START_RUN_ACTION, "document-translation")
        .await
        .unwrap());
    for task in LEAF_TASKS {
        assert!(is_allowed(&fixture.policies, "workflow-coordinator", INVOKE_TASK_ACTION, task)
            .await
            .unwrap());
    }
    assert!(!is_allowed(&fixture.policies, "upload-dispatcher", INVOKE_TASK_ACTION, TRANSLATOR_TASK)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_grant_repeated_shouldKeepOnePolicyPerRole() {
    let fixture = sqlite_fixture(Config::default());

    for request in [RequestType::Create, RequestType::Update, RequestType::Create] {
        assert!(fixture.controller.grant(request).await.is_success());
    }

    let dispatcher = fixture.policies.list_policies("upload-dispatcher").await.unwrap();
    let coordinator = fixture.policies.list_policies("workflow-coordinator").await.unwrap();
    assert_eq!(dispatcher.len(), 1);
    assert_eq!(dispatcher[0].0, DISPATCHER_POLICY_NAME);
    assert_eq!(coordinator.len(), 1);
    assert_eq!(coordinator[0].0, COORDINATOR_POLICY_NAME);
}

#[tokio::test]
async fn test_grant_update_withNewWorkflowId_shouldReplaceResource() {
    let fixture = sqlite_fixture(Config::default());
    fixture.controller.grant(RequestType::Create).await;

    let mut config = Config::default();
    config.workflow.workflow_id = "translation-v2".to_string();
    let controller = Controller::with_services(config, fixture.controller.services().clone());
    assert!(controller.grant(RequestType::Update).await.is_success());

    assert!(is_allowed(&fixture.policies, "upload-dispatcher", START_RUN_ACTION, "translation-v2")
        .await
        .unwrap());
    assert!(!is_allowed(&fixture.policies, "upload-dispatcher", START_RUN_ACTION, "document-translation")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_grant_delete_withNothingGranted_shouldSucceed() {
    let fixture = sqlite_fixture(Config::default());

    let first = fixture.controller.grant(RequestType::Delete).await;
    let second = fixture.controller.grant(RequestType::Delete).await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert!(fixture.policies.list_policies("upload-dispatcher").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_grant_withEmptyWorkflowId_shouldReportFailure() {
    let mut config = Config::default();
    config.workflow.workflow_id = String::new();
    let fixture = sqlite_fixture(config);

    let outcome = fixture.controller.grant(RequestType::Create).await;

    assert_eq!(outcome.status, OutcomeStatus::Failed);
    assert!(fixture.policies.list_policies("upload-dispatcher").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_injectEnv_shouldWriteWorkflowIdForDispatcher() {
    let fixture = sqlite_fixture(Config::default());

    let outcome = fixture.controller.inject_env(RequestType::Create).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.physical_resource_id, format!("{}-env-updater", DISPATCHER_FUNCTION));
    let environment = fixture.functions.get_environment(DISPATCHER_FUNCTION).await.unwrap().unwrap();
    assert_eq!(environment.get(WORKFLOW_ID_VAR).map(String::as_str), Some("document-translation"));
}

#[tokio::test]
async fn test_injectEnv_delete_shouldKeepEnvironment() {
    let fixture = sqlite_fixture(Config::default());
    fixture.controller.inject_env(RequestType::Create).await;

    let outcome = fixture.controller.inject_env(RequestType::Delete).await;

    assert!(outcome.is_success());
    assert!(fixture.functions.get_environment(DISPATCHER_FUNCTION).await.unwrap().is_some());
}

#[tokio::test]
async fn test_bootstrap_shouldRunBothActions() {
    let fixture = sqlite_fixture(Config::default());

    let outcomes = fixture.controller.bootstrap(RequestType::Create).await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| outcome.is_success()));
    assert_eq!(fixture.policies.list_policies("workflow-coordinator").await.unwrap().len(), 1);
    assert!(fixture.functions.get_environment(DISPATCHER_FUNCTION).await.unwrap().is_some());
}
