/*!
 * End-to-end runs through the controller: upload events, foreground
 * translation and translation-memory context, all against mock services.
 */

use docflow::bootstrap::RequestType;
use docflow::database::models::RunState;
use docflow::errors::WorkflowError;
use docflow::providers::mock::{MockBehavior, MockGeneration};
use docflow::workflow::{UploadEvent, UploadRecord};

use crate::common::{section_body, test_config, MockServices, DOCS_BUCKET};

fn upload_event(keys: &[&str]) -> UploadEvent {
    UploadEvent {
        records: keys
            .iter()
            .map(|key| UploadRecord {
                bucket: DOCS_BUCKET.to_string(),
                key: key.to_string(),
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_dispatch_afterBootstrap_shouldTranslateEveryUpload() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "in/first report.txt", section_body(2), Some("text/plain"));
    mocks.store.insert(DOCS_BUCKET, "in/second.md", section_body(3), Some("text/markdown"));
    let controller = mocks.controller(test_config());

    assert!(controller.bootstrap(RequestType::Create).await.iter().all(|o| o.is_success()));
    let report = controller
        .dispatch(&upload_event(&["in/first+report.txt", "in/second.md"]))
        .await
        .unwrap();

    assert_eq!(report.started(), 2);
    assert_eq!(
        mocks.store.text(DOCS_BUCKET, "translated/first report_es.txt").as_deref(),
        Some("[TRANSLATED] Part 1\n\n[TRANSLATED] Part 2")
    );
    assert!(mocks.store.contains(DOCS_BUCKET, "translated/second_es.txt"));
    assert_eq!(mocks.generator.call_count(), 5);
    assert_eq!(mocks.mailer.sent().len(), 2);

    let completed = controller.list_runs(Some(RunState::Completed), 10).await.unwrap();
    assert_eq!(completed.len(), 2);
}

#[tokio::test]
async fn test_dispatch_withUnsupportedUpload_shouldStillStartTheOthers() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "photo.png", "png", Some("image/png"));
    mocks.store.insert(DOCS_BUCKET, "notes.txt", section_body(1), Some("text/plain"));
    let controller = mocks.controller(test_config());
    controller.inject_env(RequestType::Create).await;

    let report = controller.dispatch(&upload_event(&["photo.png", "notes.txt"])).await.unwrap();

    assert_eq!(report.started(), 1);
    assert_eq!(
        report.outcomes[0].result,
        Err(WorkflowError::UnsupportedMediaType("image/png".to_string()))
    );
    assert!(mocks.store.contains(DOCS_BUCKET, "translated/notes_es.txt"));
}

#[tokio::test]
async fn test_dispatch_withoutInjectedEnvironment_shouldStartNothing() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "notes.txt", section_body(1), Some("text/plain"));
    let controller = mocks.controller(test_config());

    let report = controller.dispatch(&upload_event(&["notes.txt"])).await.unwrap();

    assert_eq!(report.failed(), 1);
    assert!(matches!(report.outcomes[0].result, Err(WorkflowError::RunStartFailure(_))));
    assert_eq!(mocks.generator.call_count(), 0);
}

#[tokio::test]
async fn test_dispatch_withEnforcedPermissions_beforeGrant_shouldRejectRun() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "notes.txt", section_body(1), Some("text/plain"));
    let mut config = test_config();
    config.workflow.enforce_permissions = true;
    let controller = mocks.controller(config);
    controller.inject_env(RequestType::Create).await;

    let report = controller.dispatch(&upload_event(&["notes.txt"])).await.unwrap();

    match &report.outcomes[0].result {
        Err(WorkflowError::RunStartFailure(message)) => assert!(message.contains("workflow:StartRun")),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(mocks.generator.call_count(), 0);
}

#[tokio::test]
async fn test_dispatch_withEnforcedPermissions_afterBootstrap_shouldComplete() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "notes.txt", section_body(2), Some("text/plain"));
    let mut config = test_config();
    config.workflow.enforce_permissions = true;
    let controller = mocks.controller(config);
    controller.bootstrap(RequestType::Create).await;

    let report = controller.dispatch(&upload_event(&["notes.txt"])).await.unwrap();

    assert_eq!(report.started(), 1);
    assert!(mocks.store.contains(DOCS_BUCKET, "translated/notes_es.txt"));
    assert_eq!(mocks.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_dispatch_afterRevoke_shouldRejectRun() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "notes.txt", section_body(1), Some("text/plain"));
    let mut config = test_config();
    config.workflow.enforce_permissions = true;
    let controller = mocks.controller(config);
    controller.bootstrap(RequestType::Create).await;

    assert!(controller.grant(RequestType::Delete).await.is_success());
    let report = controller.dispatch(&upload_event(&["notes.txt"])).await.unwrap();

    assert_eq!(report.failed(), 1);
    assert!(mocks.policies.is_empty());
}

#[tokio::test]
async fn test_translate_shouldRecordCompletedRun() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert_with_tags(
        DOCS_BUCKET,
        "reports/q3.txt",
        section_body(4),
        "text/plain",
        &[("target-language", "fr"), ("notify-email", "owner@example.com")],
    );
    let controller = mocks.controller(test_config());

    let combined = controller.translate(DOCS_BUCKET, "reports/q3.txt").await.unwrap();

    assert_eq!(combined.key, "translated/q3_fr.txt");
    assert_eq!(combined.section_count, 4);
    assert_eq!(mocks.mailer.sent()[0].to, vec!["owner@example.com".to_string()]);

    let runs = controller.list_runs(None, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].state, RunState::Completed);
    assert_eq!(runs[0].translated_count, 4);
}

#[tokio::test]
async fn test_translate_withFailingSection_shouldRecordFailedRun() {
    let mocks = MockServices::new(MockGeneration::new(MockBehavior::FailWhenContains("Part 3".to_string())));
    mocks.store.insert(DOCS_BUCKET, "report.txt", section_body(4), Some("text/plain"));
    let controller = mocks.controller(test_config());

    let result = controller.translate(DOCS_BUCKET, "report.txt").await;

    assert!(result.is_err());
    assert!(!mocks.store.contains(DOCS_BUCKET, "translated/report_es.txt"));
    assert!(mocks.mailer.sent().is_empty());

    let failed = controller.list_runs(Some(RunState::Failed), 10).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].failure_kind.as_deref(), Some("TranslationFailed"));
}

#[tokio::test]
async fn test_translate_withNotificationsDisabled_shouldSendNothing() {
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert(DOCS_BUCKET, "report.txt", section_body(2), Some("text/plain"));
    let mut config = test_config();
    config.notifications.enabled = false;
    let controller = mocks.controller(config);

    controller.translate(DOCS_BUCKET, "report.txt").await.unwrap();

    assert!(mocks.mailer.sent().is_empty());
    assert!(mocks.store.contains(DOCS_BUCKET, "translated/report_es.txt"));
}

#[tokio::test]
async fn test_translate_withMissingObject_shouldFail() {
    let mocks = MockServices::new(MockGeneration::working());
    let controller = mocks.controller(test_config());

    assert!(controller.translate(DOCS_BUCKET, "missing.txt").await.is_err());
    assert_eq!(mocks.generator.call_count(), 0);
}

#[tokio::test]
async fn test_translate_afterTmxIngest_shouldSendMemoryAsContext() {
    let tmx = r#"<?xml version="1.0" encoding="UTF-8"?>
<tmx version="1.4">
  <header srclang="en"/>
  <body>
    <tu>
      <tuv xml:lang="en"><seg>Save file</seg></tuv>
      <tuv xml:lang="es"><seg>Guardar archivo</seg></tuv>
    </tu>
  </body>
</tmx>"#;
    let mocks = MockServices::new(MockGeneration::working());
    mocks.store.insert("tmx", "glossary.tmx", tmx, Some("application/xml"));
    mocks.store.insert(DOCS_BUCKET, "menu.txt", "Save file", Some("text/plain"));
    let controller = mocks.controller(test_config());

    let ingested = controller.ingest_tmx("tmx", "glossary.tmx").await.unwrap();
    controller.translate(DOCS_BUCKET, "menu.txt").await.unwrap();

    assert_eq!(ingested.stored, 1);
    let prompts = mocks.generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Guardar archivo"));
    assert!(prompts[0].ends_with("Text: Save file"));
}
