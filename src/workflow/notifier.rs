/*!
 * Completion notice for a combined translation.
 */

use log::info;
use std::sync::Arc;
use std::time::Duration;

use super::document::CombinedDocument;
use crate::app_config::Config;
use crate::errors::WorkflowError;
use crate::providers::{EmailMessage, MailSender};
use crate::storage::BlobStore;

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub sender: String,
    /// Used when the document names no recipient
    pub default_recipient: Option<String>,
    pub link_expiry: Duration,
}

impl NotifierSettings {
    /// Settings for an enabled notifier; `None` when notifications are off
    pub fn from_config(config: &Config) -> Option<Self> {
        let sender = config.notifications.active_sender()?;
        Some(Self {
            sender: sender.to_string(),
            default_recipient: config.notifications.default_recipient.clone(),
            link_expiry: config.storage.link_expiry(),
        })
    }
}

/// Confidence as a percentage with two decimals
fn format_confidence(confidence: f64) -> String {
    format!("{:.2}%", confidence * 100.0)
}

/// Human wording for a link lifetime, e.g. "7 days"
fn describe_expiry(expiry: Duration) -> String {
    let secs = expiry.as_secs();
    let (amount, unit) = if secs % 86_400 == 0 {
        (secs / 86_400, "day")
    } else if secs % 3_600 == 0 {
        (secs / 3_600, "hour")
    } else if secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };

    if amount == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", amount, unit)
    }
}

/// Build the completion message for `combined`
pub fn compose_message(
    combined: &CombinedDocument,
    link: &str,
    from: &str,
    to: &str,
    expiry: Duration,
) -> EmailMessage {
    let confidence = format_confidence(combined.confidence);
    let expires = describe_expiry(expiry);

    let html_body = format!(
        "<html>\n<body>\n\
         <h2>Translation Complete</h2>\n\
         <p>Your document has been translated successfully.</p>\n\
         <ul>\n\
         <li><strong>Document ID:</strong> {id}</li>\n\
         <li><strong>Source Language:</strong> {src}</li>\n\
         <li><strong>Target Language:</strong> {tgt}</li>\n\
         <li><strong>Confidence Score:</strong> {confidence}</li>\n\
         </ul>\n\
         <p><a href=\"{link}\">Download Translation</a></p>\n\
         <p>This link will expire in {expires}.</p>\n\
         </body>\n</html>",
        id = combined.document_id,
        src = combined.source_language,
        tgt = combined.target_language,
        confidence = confidence,
        link = link,
        expires = expires,
    );

    let text_body = format!(
        "Translation Complete\n\n\
         Your document has been translated successfully.\n\n\
         Document ID: {id}\n\
         Source Language: {src}\n\
         Target Language: {tgt}\n\
         Confidence Score: {confidence}\n\n\
         Download Translation: {link}\n\n\
         This link will expire in {expires}.",
        id = combined.document_id,
        src = combined.source_language,
        tgt = combined.target_language,
        confidence = confidence,
        link = link,
        expires = expires,
    );

    EmailMessage {
        from: from.to_string(),
        to: vec![to.to_string()],
        subject: format!("Translation Complete - {}", combined.document_id),
        html_body,
        text_body,
    }
}

#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    store: Arc<dyn BlobStore>,
    mailer: Arc<dyn MailSender>,
    settings: NotifierSettings,
}

impl CompletionNotifier {
    pub fn new(store: Arc<dyn BlobStore>, mailer: Arc<dyn MailSender>, settings: NotifierSettings) -> Self {
        Self {
            store,
            mailer,
            settings,
        }
    }

    /// Send a download link for `combined` to `recipient` or the default recipient
    pub async fn notify(&self, combined: &CombinedDocument, recipient: Option<&str>) -> Result<(), WorkflowError> {
        let to = recipient
            .or(self.settings.default_recipient.as_deref())
            .filter(|r| !r.trim().is_empty())
            .ok_or_else(|| {
                WorkflowError::NotificationFailure(format!("No recipient for document '{}'", combined.document_id))
            })?;

        let link = self
            .store
            .presign_get(&combined.bucket, &combined.key, self.settings.link_expiry)
            .await
            .map_err(|e| WorkflowError::NotificationFailure(format!("Cannot sign download link: {:#}", e)))?;

        let message = compose_message(combined, &link, &self.settings.sender, to, self.settings.link_expiry);
        self.mailer
            .send(&message)
            .await
            .map_err(|e| WorkflowError::NotificationFailure(e.to_string()))?;

        info!("Sent completion notice for '{}' to {}", combined.document_id, to);
        Ok(())
    }
}
