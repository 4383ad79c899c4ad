/*!
 * Mock provider implementations for testing.
 *
 * The mocks share one `MockBehavior` switch:
 * - `Working` always succeeds
 * - `Failing` always errors
 * - `Intermittent` errors on every Nth call
 * - `FailWhenContains` errors when the input contains a marker
 * - `Slow` succeeds after a delay (timeout and concurrency tests)
 * - `Empty` succeeds with an empty result
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{CompletionRequest, EmailMessage, EmbeddingProvider, GenerationProvider, MailSender};
use crate::errors::ProviderError;

/// Dimension of mock embedding vectors
pub const MOCK_EMBEDDING_DIM: usize = 8;

/// Behavior mode for the mock providers
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    Working,
    Failing,
    Intermittent { fail_every: usize },
    FailWhenContains(String),
    Slow { delay_ms: u64 },
    Empty,
}

/// Call accounting shared between clones
#[derive(Debug, Default)]
struct CallStats {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallStats {
    fn enter(&self) -> usize {
        let count = self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        count
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Apply the behavior for one call; `Ok(true)` means "answer empty"
async fn apply_behavior(behavior: &MockBehavior, count: usize, input: &str) -> Result<bool, ProviderError> {
    match behavior {
        MockBehavior::Working => Ok(false),
        MockBehavior::Failing => Err(ProviderError::ApiError {
            status_code: 500,
            message: "Simulated provider failure".to_string(),
        }),
        MockBehavior::Intermittent { fail_every } => {
            if *fail_every > 0 && count % fail_every == fail_every - 1 {
                Err(ProviderError::ApiError {
                    status_code: 503,
                    message: format!("Simulated intermittent failure (request #{})", count + 1),
                })
            } else {
                Ok(false)
            }
        }
        MockBehavior::FailWhenContains(marker) => {
            if input.contains(marker.as_str()) {
                Err(ProviderError::ApiError {
                    status_code: 500,
                    message: format!("Simulated failure for input containing '{}'", marker),
                })
            } else {
                Ok(false)
            }
        }
        MockBehavior::Slow { delay_ms } => {
            tokio::time::sleep(tokio::time::Duration::from_millis(*delay_ms)).await;
            Ok(false)
        }
        MockBehavior::Empty => Ok(true),
    }
}

/// Deterministic bag-of-bytes embedding, L2 normalized
pub fn mock_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; MOCK_EMBEDDING_DIM];
    for (i, byte) in text.bytes().enumerate() {
        vector[(byte as usize + i) % MOCK_EMBEDDING_DIM] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Mock embedding provider
#[derive(Debug, Clone)]
pub struct MockEmbeddings {
    behavior: MockBehavior,
    stats: Arc<CallStats>,
}

impl MockEmbeddings {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            stats: Arc::new(CallStats::default()),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn call_count(&self) -> usize {
        self.stats.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let count = self.stats.enter();
        let outcome = apply_behavior(&self.behavior, count, text).await;
        self.stats.leave();

        if outcome? {
            return Ok(Vec::new());
        }
        Ok(mock_embedding(text))
    }

    fn model(&self) -> &str {
        "mock-embedding"
    }
}

/// Mock generation provider
///
/// Answers `[TRANSLATED] <text>` where `<text>` is whatever follows the last
/// `Text: ` marker of the prompt, or the whole prompt when there is none.
#[derive(Debug, Clone)]
pub struct MockGeneration {
    behavior: MockBehavior,
    stats: Arc<CallStats>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockGeneration {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            stats: Arc::new(CallStats::default()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    pub fn call_count(&self) -> usize {
        self.stats.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous `generate` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerationProvider for MockGeneration {
    async fn generate(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        self.prompts.lock().push(request.prompt.clone());

        let text = request
            .prompt
            .rsplit_once("Text: ")
            .map(|(_, text)| text)
            .unwrap_or(&request.prompt);

        let count = self.stats.enter();
        let outcome = apply_behavior(&self.behavior, count, text).await;
        self.stats.leave();

        if outcome? {
            return Ok(String::new());
        }
        Ok(format!("[TRANSLATED] {}", text))
    }

    fn model(&self) -> &str {
        "mock-generation"
    }
}

/// Mock mail sender recording every message
#[derive(Debug, Clone)]
pub struct MockMailer {
    behavior: MockBehavior,
    stats: Arc<CallStats>,
    sent: Arc<Mutex<Vec<EmailMessage>>>,
}

impl MockMailer {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            stats: Arc::new(CallStats::default()),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl MailSender for MockMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), ProviderError> {
        let count = self.stats.enter();
        let outcome = apply_behavior(&self.behavior, count, &message.subject).await;
        self.stats.leave();

        outcome?;
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            prompt: prompt.to_string(),
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    #[tokio::test]
    async fn test_workingGeneration_shouldTranslateTextAfterMarker() {
        let provider = MockGeneration::working();

        let response = provider.generate(&request("Context...\nText: Hello world")).await.unwrap();

        assert_eq!(response, "[TRANSLATED] Hello world");
        assert_eq!(provider.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_failingGeneration_shouldReturnError() {
        let provider = MockGeneration::failing();
        assert!(provider.generate(&request("Text: a")).await.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_intermittentGeneration_shouldFailEveryNth() {
        let provider = MockGeneration::new(MockBehavior::Intermittent { fail_every: 3 });

        let mut failures = 0;
        for _ in 0..6 {
            if provider.generate(&request("Text: a")).await.is_err() {
                failures += 1;
            }
        }
        assert_eq!(failures, 2);
    }

    #[tokio::test]
    async fn test_failWhenContains_shouldOnlyFailMarkedInput() {
        let provider = MockGeneration::new(MockBehavior::FailWhenContains("boom".to_string()));

        assert!(provider.generate(&request("Text: fine")).await.is_ok());
        assert!(provider.generate(&request("Text: boom")).await.is_err());
    }

    #[tokio::test]
    async fn test_clonedMock_shouldShareCounters() {
        let provider = MockEmbeddings::working();
        let cloned = provider.clone();

        cloned.embed("hello").await.unwrap();
        assert_eq!(provider.call_count(), 1);
    }

    #[test]
    fn test_mockEmbedding_shouldBeDeterministicAndNormalized() {
        let a = mock_embedding("Hello");
        assert_eq!(a, mock_embedding("Hello"));
        assert_eq!(a.len(), MOCK_EMBEDDING_DIM);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(mock_embedding("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_mockMailer_shouldRecordSentMessages() {
        let mailer = MockMailer::working();
        let message = EmailMessage {
            from: "a@example.com".to_string(),
            to: vec!["b@example.com".to_string()],
            subject: "s".to_string(),
            html_body: "h".to_string(),
            text_body: "t".to_string(),
        };

        mailer.send(&message).await.unwrap();
        assert_eq!(mailer.sent(), vec![message.clone()]);

        assert!(MockMailer::failing().send(&message).await.is_err());
    }
}
