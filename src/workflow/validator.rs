/*!
 * Document validator: the content-type gate and section splitting.
 */

use log::{debug, info, warn};
use std::sync::Arc;

use super::document::{is_supported_media_type, split_sections, Document, RunInput, Section};
use crate::app_config::Config;
use crate::errors::WorkflowError;
use crate::storage::BlobStore;

/// Metadata tag naming the document's source language
pub const SOURCE_LANGUAGE_TAG: &str = "source-language";
/// Metadata tag naming the requested target language
pub const TARGET_LANGUAGE_TAG: &str = "target-language";
/// Metadata tag naming who to notify on completion
pub const NOTIFY_EMAIL_TAG: &str = "notify-email";

/// Settings the validator needs from the configuration
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    pub default_source_language: String,
    pub default_target_language: String,
    pub max_section_chars: usize,
}

impl From<&Config> for ValidatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_source_language: config.workflow.default_source_language.clone(),
            default_target_language: config.workflow.default_target_language.clone(),
            max_section_chars: config.workflow.max_section_chars,
        }
    }
}

/// Output of a successful validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDocument {
    pub document: Document,
    pub sections: Vec<Section>,
    /// Notification recipient from object metadata, if any
    pub recipient: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentValidator {
    store: Arc<dyn BlobStore>,
    settings: ValidatorSettings,
}

impl DocumentValidator {
    pub fn new(store: Arc<dyn BlobStore>, settings: ValidatorSettings) -> Self {
        Self { store, settings }
    }

    /// Gate the declared media type, then read and split the document
    ///
    /// A rejected media type returns before the store is touched.
    pub async fn validate(&self, input: &RunInput) -> Result<ValidatedDocument, WorkflowError> {
        if !is_supported_media_type(&input.content_type) {
            warn!("Rejecting {}/{}: unsupported type '{}'", input.bucket, input.key, input.content_type);
            return Err(WorkflowError::UnsupportedMediaType(input.content_type.clone()));
        }

        let read_failure = |e: anyhow::Error| WorkflowError::StorageReadFailure {
            key: input.key.clone(),
            message: format!("{:#}", e),
        };

        let metadata = self.store.head(&input.bucket, &input.key).await.map_err(read_failure)?;
        let body = self.store.get(&input.bucket, &input.key).await.map_err(read_failure)?;

        let source_language = metadata
            .tag(SOURCE_LANGUAGE_TAG)
            .unwrap_or(self.settings.default_source_language.as_str())
            .to_string();
        let target_language = metadata
            .tag(TARGET_LANGUAGE_TAG)
            .unwrap_or(self.settings.default_target_language.as_str())
            .to_string();

        let text = String::from_utf8_lossy(&body);
        let sections = split_sections(&text, self.settings.max_section_chars);
        debug!("Split {} bytes into {} sections", body.len(), sections.len());

        info!(
            "Validated document '{}' ({} -> {}, {} sections)",
            input.document_id,
            source_language,
            target_language,
            sections.len()
        );

        Ok(ValidatedDocument {
            document: Document {
                document_id: input.document_id.clone(),
                bucket: input.bucket.clone(),
                key: input.key.clone(),
                content_type: input.content_type.clone(),
                source_language,
                target_language,
            },
            sections,
            recipient: metadata.tag(NOTIFY_EMAIL_TAG).map(str::to_string),
        })
    }
}
