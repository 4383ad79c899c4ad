use anyhow::Result;
use async_trait::async_trait;
use log::{error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionRequest, EmbeddingProvider, GenerationProvider};
use crate::errors::ProviderError;

/// Ollama client for interacting with Ollama API
#[derive(Debug, Clone)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    /// Retries after the first attempt, server errors and network errors only
    max_retries: u32,
    /// Base backoff time in milliseconds for exponential backoff
    backoff_base_ms: u64,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub model: String,
    #[serde(default)]
    pub created_at: String,
    /// Generated text
    pub response: String,
    #[serde(default)]
    pub done: bool,
}

/// Embeddings request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    model: String,
    prompt: String,
}

/// Embeddings response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
            stream: Some(false),
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        let options = self.options.get_or_insert(GenerationOptions {
            temperature: None,
            num_predict: None,
        });
        options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        let options = self.options.get_or_insert(GenerationOptions {
            temperature: None,
            num_predict: None,
        });
        options.num_predict = Some(max_tokens);
        self
    }
}

impl Ollama {
    /// Create a client from a complete base URL such as `http://localhost:11434`
    pub fn from_url(url: impl AsRef<str>, timeout_secs: u64) -> Self {
        Self {
            base_url: url.as_ref().trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .pool_idle_timeout(Duration::from_secs(90))
                .build()
                .unwrap_or_default(),
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST a JSON body, retrying server and network errors with exponential backoff
    async fn post_json<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<String, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;

        loop {
            let outcome = match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .text()
                            .await
                            .map_err(|e| ProviderError::ParseError(e.to_string()));
                    }

                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to get error response text".to_string());
                    let error = ProviderError::ApiError {
                        status_code: status.as_u16(),
                        message: error_text,
                    };
                    if !status.is_server_error() {
                        error!("Ollama API error: {}", error);
                        return Err(error);
                    }
                    error
                }
                Err(e) => ProviderError::ConnectionError(e.to_string()),
            };

            attempt += 1;
            if attempt > self.max_retries {
                error!("Ollama request to {} failed after {} attempts: {}", path, attempt, outcome);
                return Err(outcome);
            }

            warn!("Ollama request to {} failed ({}), attempt {}/{}", path, outcome, attempt, self.max_retries + 1);
            let backoff_ms = self.backoff_base_ms * (1u64 << (attempt - 1));
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
    }

    /// Generate text from the Ollama API
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let body = self.post_json("/api/generate", &request).await?;
        parse_generation_body(&body)
    }

    /// Generate an embedding vector
    pub async fn embed(&self, model: impl Into<String>, prompt: impl Into<String>) -> Result<EmbeddingResponse, ProviderError> {
        let request = EmbeddingRequest {
            model: model.into(),
            prompt: prompt.into(),
        };
        let body = self.post_json("/api/embeddings", &request).await?;

        let response: EmbeddingResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse Ollama embeddings response: {}", e);
            ProviderError::ParseError(e.to_string())
        })?;

        if response.embedding.is_empty() {
            return Err(ProviderError::ParseError("Ollama returned an empty embedding".to_string()));
        }
        Ok(response)
    }
}

/// Parse a generate body, accepting both a single object and streamed JSON lines
fn parse_generation_body(body: &str) -> Result<GenerationResponse, ProviderError> {
    if let Ok(response) = serde_json::from_str::<GenerationResponse>(body) {
        return Ok(response);
    }

    let mut model = String::new();
    let mut text = String::new();
    let mut parsed_any = false;
    for line in body.lines().filter(|l| !l.trim().is_empty()) {
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| ProviderError::ParseError(format!("Invalid JSON line in Ollama response: {}", e)))?;
        parsed_any = true;
        if let Some(part) = value.get("response").and_then(|v| v.as_str()) {
            text.push_str(part);
        }
        if let Some(name) = value.get("model").and_then(|v| v.as_str()) {
            model = name.to_string();
        }
    }

    if !parsed_any {
        return Err(ProviderError::ParseError("Empty Ollama response".to_string()));
    }

    Ok(GenerationResponse {
        model,
        created_at: String::new(),
        response: text,
        done: true,
    })
}

/// `EmbeddingProvider` backed by Ollama
#[derive(Debug, Clone)]
pub struct OllamaEmbeddings {
    client: Ollama,
    model: String,
}

impl OllamaEmbeddings {
    pub fn new(client: Ollama, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.client.embed(&self.model, text).await?.embedding)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// `GenerationProvider` backed by Ollama
#[derive(Debug, Clone)]
pub struct OllamaGeneration {
    client: Ollama,
    model: String,
}

impl OllamaGeneration {
    pub fn new(client: Ollama, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGeneration {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let request = GenerationRequest::new(&self.model, &request.prompt)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens);

        Ok(self.client.generate(request).await?.response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
