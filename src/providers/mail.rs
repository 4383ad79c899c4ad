/*!
 * Mail senders.
 *
 * `WebhookMailer` posts each message as JSON to an HTTP relay.
 * `OutboxMailer` drops each message as a JSON file into a directory, for
 * hosts without a relay and for inspection during tests.
 */

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{EmailMessage, MailSender};
use crate::errors::ProviderError;

/// Sends mail through an HTTP relay
#[derive(Debug, Clone)]
pub struct WebhookMailer {
    client: Client,
    url: String,
}

impl WebhookMailer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl MailSender for WebhookMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Mail relay rejected message ({}): {}", status, error_text);
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: error_text,
            });
        }

        info!("Sent '{}' to {}", message.subject, message.to.join(", "));
        Ok(())
    }
}

/// Writes each message to `<dir>/<timestamp>-<uuid>.json`
#[derive(Debug, Clone)]
pub struct OutboxMailer {
    dir: PathBuf,
}

impl OutboxMailer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl MailSender for OutboxMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("Cannot create outbox {:?}: {}", self.dir, e)))?;

        let file_name = format!(
            "{}-{}.json",
            chrono::Utc::now().format("%Y%m%dT%H%M%S"),
            uuid::Uuid::new_v4()
        );
        let path = self.dir.join(file_name);
        let body = serde_json::to_vec_pretty(message).map_err(|e| ProviderError::ParseError(e.to_string()))?;

        tokio::fs::write(&path, body)
            .await
            .map_err(|e| ProviderError::RequestFailed(format!("Cannot write {:?}: {}", path, e)))?;

        debug!("Queued '{}' in {:?}", message.subject, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn message() -> EmailMessage {
        EmailMessage {
            from: "noreply@example.com".to_string(),
            to: vec!["reader@example.com".to_string()],
            subject: "Translation Complete - doc123".to_string(),
            html_body: "<p>done</p>".to_string(),
            text_body: "done".to_string(),
        }
    }

    #[tokio::test]
    async fn test_outboxMailer_shouldWriteOneFilePerMessage() {
        let dir = TempDir::new().unwrap();
        let mailer = OutboxMailer::new(dir.path().join("outbox"));

        mailer.send(&message()).await.unwrap();
        mailer.send(&message()).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(mailer.dir()).unwrap().collect();
        assert_eq!(files.len(), 2);

        let path = files[0].as_ref().unwrap().path();
        let stored: EmailMessage = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(stored, message());
    }

    #[tokio::test]
    async fn test_webhookMailer_withUnreachableRelay_shouldFail() {
        let mailer = WebhookMailer::new("http://127.0.0.1:9/relay");
        assert!(mailer.send(&message()).await.is_err());
    }
}
