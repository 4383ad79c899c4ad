/*!
 * Tests for workflow error kinds and messages
 */

use docflow::errors::WorkflowError;

#[test]
fn test_section_shouldWrapLeafCause() {
    let error = WorkflowError::section(4, WorkflowError::GenerationFailure("model overloaded".to_string()));

    assert_eq!(error.kind(), "TranslationFailed");
    assert_eq!(
        error.to_string(),
        "Translation of section 4 failed: Generation failed: model overloaded"
    );
}

#[test]
fn test_kind_shouldNameEachVariant() {
    let cases = [
        (WorkflowError::UnsupportedMediaType("image/png".to_string()), "UnsupportedMediaType"),
        (
            WorkflowError::LeafTimeout {
                stage: "section-translator".to_string(),
                timeout_secs: 300,
            },
            "LeafTimeout",
        ),
        (WorkflowError::RunStartFailure("throttled".to_string()), "RunStartFailure"),
        (WorkflowError::NotificationFailure("no recipient".to_string()), "NotificationFailure"),
    ];

    for (error, kind) in cases {
        assert_eq!(error.kind(), kind);
    }
}

#[test]
fn test_accessDenied_shouldNamePrincipalActionAndResource() {
    let error = WorkflowError::AccessDenied {
        principal: "upload-dispatcher".to_string(),
        action: "workflow:StartRun".to_string(),
        resource: "document-translation".to_string(),
    };

    assert_eq!(
        error.to_string(),
        "Access denied: upload-dispatcher may not workflow:StartRun on document-translation"
    );
}

#[test]
fn test_unsupportedMediaType_shouldMentionType() {
    let error = WorkflowError::UnsupportedMediaType("image/jpeg".to_string());

    assert_eq!(error.to_string(), "Unsupported file type: image/jpeg");
}
