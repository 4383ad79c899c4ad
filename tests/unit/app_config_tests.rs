/*!
 * Tests for configuration defaults, overrides and validation
 */

use std::collections::HashMap;
use std::time::Duration;

use docflow::app_config::{Config, GenerationBackend, LogLevel};

#[test]
fn test_default_shouldValidate() {
    let config = Config::default();

    assert!(config.validate().is_ok());
    assert_eq!(config.workflow.workflow_id, "document-translation");
    assert_eq!(config.storage.link_expiry(), Duration::from_secs(604_800));
    assert!(!config.workflow.enforce_permissions);
}

#[test]
fn test_deserialize_withEmptyObject_shouldFillDefaults() {
    let config: Config = serde_json::from_str("{}").unwrap();

    assert_eq!(config.models.backend, GenerationBackend::Ollama);
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.workflow.dispatcher_role, "roles/upload-dispatcher");
    assert_eq!(config.workflow.coordinator_role, "roles/workflow-coordinator");
    assert!(config.validate().is_ok());
}

#[test]
fn test_deserialize_withPartialSection_shouldKeepOtherDefaults() {
    let json = r#"{ "workflow": { "max_concurrency": 2, "enforce_permissions": true } }"#;
    let config: Config = serde_json::from_str(json).unwrap();

    assert_eq!(config.workflow.max_concurrency, 2);
    assert!(config.workflow.enforce_permissions);
    assert_eq!(config.workflow.workflow_id, "document-translation");
}

#[test]
fn test_validate_withEmptyWorkflowId_shouldFail() {
    let mut config = Config::default();
    config.workflow.workflow_id = "  ".to_string();

    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withZeroConcurrency_shouldFail() {
    let mut config = Config::default();
    config.workflow.max_concurrency = 0;

    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withUnknownDefaultLanguage_shouldFail() {
    let mut config = Config::default();
    config.workflow.default_target_language = "xx".to_string();

    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withNotificationsButNoSender_shouldFail() {
    let mut config = Config::default();
    config.notifications.enabled = true;

    assert!(config.validate().is_err());

    config.notifications.sender_email = Some("noreply@example.com".to_string());
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_withAnthropicAndNoKey_shouldFail() {
    let mut config = Config::default();
    config.models.backend = GenerationBackend::Anthropic;

    assert!(config.validate().is_err());

    config.models.api_key = "sk-test".to_string();
    assert!(config.validate().is_ok());
}

#[test]
fn test_applyOverrides_shouldEnableNotificationsFromVariables() {
    let variables: HashMap<&str, &str> = [
        ("ENABLE_EMAIL_NOTIFICATIONS", "true"),
        ("SENDER_EMAIL", "bot@example.com"),
        ("DOCUMENTS_BUCKET_NAME", "incoming"),
    ]
    .into();
    let mut config = Config::default();

    config.apply_overrides(|name| variables.get(name).map(|v| v.to_string()));

    assert_eq!(config.notifications.active_sender(), Some("bot@example.com"));
    assert_eq!(config.storage.documents_bucket, "incoming");
    assert!(config.validate().is_ok());
}

#[test]
fn test_applyOverrides_withFalseFlag_shouldDisableNotifications() {
    let mut config = Config::default();
    config.notifications.enabled = true;
    config.notifications.sender_email = Some("bot@example.com".to_string());

    config.apply_overrides(|name| (name == "ENABLE_EMAIL_NOTIFICATIONS").then(|| "false".to_string()));

    assert_eq!(config.notifications.active_sender(), None);
}
