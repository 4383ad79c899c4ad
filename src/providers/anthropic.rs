use async_trait::async_trait;
use log::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionRequest, GenerationProvider};
use crate::errors::ProviderError;

/// Anthropic client for interacting with Anthropic API
#[derive(Debug, Clone)]
pub struct Anthropic {
    client: Client,
    api_key: String,
    /// API base URL; empty means the public endpoint
    endpoint: String,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    pub content: Vec<AnthropicContent>,
    pub usage: TokenUsage,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens,
        }
    }

    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Anthropic {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        }
    }

    fn messages_url(&self) -> String {
        if self.endpoint.is_empty() {
            "https://api.anthropic.com/v1/messages".to_string()
        } else {
            format!("{}/v1/messages", self.endpoint.trim_end_matches('/'))
        }
    }

    /// Complete a messages request
    pub async fn complete(&self, request: AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("Anthropic API error ({}): {}", status, error_text);

            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(ProviderError::AuthenticationError(error_text));
            }
            return Err(ProviderError::ApiError {
                status_code: status.as_u16(),
                message: error_text,
            });
        }

        response
            .json::<AnthropicResponse>()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))
    }

    /// Concatenate the text blocks of a response
    pub fn extract_text_from_response(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

/// `GenerationProvider` backed by the Anthropic messages API
#[derive(Debug, Clone)]
pub struct AnthropicGeneration {
    client: Anthropic,
    model: String,
}

impl AnthropicGeneration {
    pub fn new(client: Anthropic, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for AnthropicGeneration {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let message = AnthropicRequest::new(&self.model, request.max_tokens)
            .temperature(request.temperature)
            .add_message("user", &request.prompt);

        let response = self.client.complete(message).await?;
        Ok(Anthropic::extract_text_from_response(&response))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
