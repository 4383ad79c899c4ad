/*!
 * Tests for starting runs on the local runtime
 */

use std::sync::Arc;

use docflow::bootstrap::policy::{PolicyDocument, START_RUN_ACTION};
use docflow::bootstrap::{AccessGuard, PolicyStore};
use docflow::errors::WorkflowError;
use docflow::providers::mock::MockGeneration;
use docflow::workflow::{LocalRunStarter, RunHandle, RunInput, RunStarter, RunStore, StartRunRequest};

use crate::common::{section_body, test_config, MockServices, DOCS_BUCKET};

fn starter(mocks: &MockServices) -> LocalRunStarter {
    let coordinator = mocks.controller(test_config()).coordinator(None);
    LocalRunStarter::new("document-translation", Arc::new(coordinator))
}

fn request(workflow_id: &str, key: &str) -> StartRunRequest {
    StartRunRequest {
        workflow_id: workflow_id.to_string(),
        input: RunInput::new(DOCS_BUCKET, key, "text/plain"),
    }
}

#[tokio::test]
async fn test_start_shouldReturnHandleAndRunToCompletion() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "a.txt", section_body(3), Some("text/plain"));
    let starter = starter(&mocks);

    let handle = starter.start(request("document-translation", "a.txt")).await.unwrap();
    let combined = starter.wait(&handle).await.unwrap();

    assert_eq!(handle.workflow_id, "document-translation");
    assert_eq!(combined.key, "translated/a_es.txt");
    let record = mocks.runs.get(&handle.run_id).await.unwrap().unwrap();
    assert_eq!(record.object_key, "a.txt");
}

#[tokio::test]
async fn test_start_twice_shouldUseDistinctRunIds() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "a.txt", section_body(1), Some("text/plain"));
    let starter = starter(&mocks);

    let first = starter.start(request("document-translation", "a.txt")).await.unwrap();
    let second = starter.start(request("document-translation", "a.txt")).await.unwrap();
    let outcomes = starter.wait_all().await;

    assert_ne!(first.run_id, second.run_id);
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(_, outcome)| outcome.is_ok()));
}

#[tokio::test]
async fn test_waitAll_shouldReleaseEveryHandle() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "a.txt", section_body(1), Some("text/plain"));
    let starter = starter(&mocks);

    let handle = starter.start(request("document-translation", "a.txt")).await.unwrap();
    starter.start(request("document-translation", "a.txt")).await.unwrap();
    assert_eq!(starter.pending_runs(), 2);

    starter.wait(&handle).await.unwrap();
    assert_eq!(starter.pending_runs(), 1);

    starter.wait_all().await;
    assert_eq!(starter.pending_runs(), 0);
}

#[tokio::test]
async fn test_start_withUnknownWorkflow_shouldFail() {
    let mocks = MockServices::new(MockGeneration::working());
    let starter = starter(&mocks);

    let result = starter.start(request("other-workflow", "a.txt")).await;

    assert!(matches!(result, Err(WorkflowError::RunStartFailure(_))));
    assert!(starter.wait_all().await.is_empty());
}

#[tokio::test]
async fn test_start_withCallerLackingGrant_shouldFail() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks
        .policies
        .put_policy(
            "upload-dispatcher",
            "StartOtherWorkflow",
            &PolicyDocument::allow(START_RUN_ACTION, ["other-workflow"]),
        )
        .await
        .unwrap();
    let starter = starter(&mocks).with_caller(AccessGuard::new(Arc::new(mocks.policies.clone()), "upload-dispatcher"));

    let result = starter.start(request("document-translation", "a.txt")).await;

    assert!(matches!(result, Err(WorkflowError::RunStartFailure(_))));
    assert_eq!(mocks.generator.call_count(), 0);
}

#[tokio::test]
async fn test_start_withCallerHoldingGrant_shouldStart() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "a.txt", section_body(1), Some("text/plain"));
    mocks
        .policies
        .put_policy(
            "upload-dispatcher",
            "StartTranslation",
            &PolicyDocument::allow(START_RUN_ACTION, ["document-translation"]),
        )
        .await
        .unwrap();
    let starter = starter(&mocks).with_caller(AccessGuard::new(Arc::new(mocks.policies.clone()), "upload-dispatcher"));

    let handle = starter.start(request("document-translation", "a.txt")).await.unwrap();

    assert!(starter.wait(&handle).await.is_ok());
}

#[tokio::test]
async fn test_wait_withUnknownHandle_shouldFail() {
    let mocks = MockServices::new(MockGeneration::working());
    let starter = starter(&mocks);
    let handle = RunHandle {
        workflow_id: "document-translation".to_string(),
        run_id: "missing".to_string(),
    };

    assert!(starter.wait(&handle).await.is_err());
}
