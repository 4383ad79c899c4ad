/*!
 * Clients for the external services the workflow depends on.
 *
 * - Ollama: local embedding and generation server
 * - Anthropic: hosted generation API
 * - Mail: webhook and outbox-directory mail senders
 * - Mock: scripted providers for tests
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

use crate::app_config::{Config, GenerationBackend};
use crate::errors::ProviderError;

pub mod ollama;
pub mod anthropic;
pub mod mail;
pub mod mock;

/// Produces embedding vectors for text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;

    /// Model identifier used for the vectors
    fn model(&self) -> &str;
}

/// A single completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Produces text completions
#[async_trait]
pub trait GenerationProvider: Send + Sync + Debug {
    /// Complete a prompt and return the generated text
    async fn generate(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    /// Model identifier, reported in translation metadata
    fn model(&self) -> &str;
}

/// An outgoing e-mail with HTML and plain-text alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

/// Delivers e-mail
#[async_trait]
pub trait MailSender: Send + Sync + Debug {
    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError>;
}

/// Build the embedding client described by the configuration
pub fn embedding_provider(config: &Config) -> Arc<dyn EmbeddingProvider> {
    Arc::new(ollama::OllamaEmbeddings::new(
        ollama::Ollama::from_url(&config.models.embedding_endpoint, config.models.timeout_secs),
        config.models.embedding_model.clone(),
    ))
}

/// Build the generation client for the configured backend
pub fn generation_provider(config: &Config) -> Arc<dyn GenerationProvider> {
    let models = &config.models;
    match models.backend {
        GenerationBackend::Ollama => Arc::new(ollama::OllamaGeneration::new(
            ollama::Ollama::from_url(models.generation_endpoint(), models.timeout_secs),
            models.translation_model.clone(),
        )),
        GenerationBackend::Anthropic => Arc::new(anthropic::AnthropicGeneration::new(
            anthropic::Anthropic::new(&models.api_key, models.generation_endpoint(), models.timeout_secs),
            models.translation_model.clone(),
        )),
    }
}

/// Build the mail sender: webhook when a URL is configured, outbox directory otherwise
pub fn mail_sender(config: &Config) -> Arc<dyn MailSender> {
    match &config.notifications.webhook_url {
        Some(url) if !url.trim().is_empty() => Arc::new(mail::WebhookMailer::new(url.clone())),
        _ => Arc::new(mail::OutboxMailer::new(config.notifications.outbox_dir.clone())),
    }
}
