/*!
 * Section translator.
 *
 * One invocation translates one section: embed the text, look up similar
 * translation-memory entries, keep the close ones as context and ask the
 * generation model for the translation.
 */

use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::document::{SectionTranslation, TranslationMetadata};
use crate::app_config::Config;
use crate::errors::WorkflowError;
use crate::language_utils;
use crate::memory::{SearchHit, SimilarityIndex};
use crate::providers::{CompletionRequest, EmbeddingProvider, GenerationProvider};

/// Confidence reported for every section translation
///
/// The generation backends expose no quality signal, so the value is fixed.
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.95;

/// Input of one translator invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRequest {
    pub section_id: u32,
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    pub document_id: String,
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct TranslatorSettings {
    /// Number of memory entries requested per section
    pub top_k: usize,
    /// Hits must score strictly above this to be used as context
    pub similarity_threshold: f32,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.8,
            max_tokens: 2000,
            temperature: 0.7,
        }
    }
}

impl From<&Config> for TranslatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            top_k: config.search.top_k,
            similarity_threshold: config.search.similarity_threshold,
            max_tokens: config.models.max_tokens,
            temperature: config.models.temperature,
        }
    }
}

/// Translations of qualifying hits in hit order, and how many there were
pub fn build_context(hits: &[SearchHit], threshold: f32) -> (String, usize) {
    let kept: Vec<&str> = hits
        .iter()
        .filter(|hit| hit.score > threshold)
        .filter_map(SearchHit::usable_translation)
        .collect();

    (kept.join("\n"), kept.len())
}

/// Prompt sent to the generation model
pub fn build_prompt(context: &str, source_language: &str, target_language: &str, text: &str) -> String {
    format!(
        "Context from similar translations:\n{}\n\n\
         Translate the following text from {} to {}, \
         maintaining consistency with the context provided above:\n\n\
         Text: {}",
        context,
        language_utils::display_name(source_language),
        language_utils::display_name(target_language),
        text
    )
}

#[derive(Debug, Clone)]
pub struct SectionTranslator {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn SimilarityIndex>,
    generator: Arc<dyn GenerationProvider>,
    settings: TranslatorSettings,
}

impl SectionTranslator {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn SimilarityIndex>,
        generator: Arc<dyn GenerationProvider>,
        settings: TranslatorSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            settings,
        }
    }

    /// Translate one section
    ///
    /// Errors are the leaf failure (`EmbeddingFailure`, `SimilaritySearchFailure`
    /// or `GenerationFailure`); the caller attaches the section id.
    pub async fn translate(&self, request: &SectionRequest) -> Result<SectionTranslation, WorkflowError> {
        let embedding = self
            .embedder
            .embed(&request.text)
            .await
            .map_err(|e| WorkflowError::EmbeddingFailure(e.to_string()))?;

        let hits = self
            .index
            .search(&embedding, self.settings.top_k)
            .await
            .map_err(|e| WorkflowError::SimilaritySearchFailure(format!("{:#}", e)))?;

        let (context, context_size) = build_context(&hits, self.settings.similarity_threshold);
        debug!(
            "Section {} of '{}': {} of {} memory hits used as context",
            request.section_id,
            request.document_id,
            context_size,
            hits.len()
        );

        let completion = CompletionRequest {
            prompt: build_prompt(&context, &request.source_language, &request.target_language, &request.text),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        };

        let translated_text = self
            .generator
            .generate(&completion)
            .await
            .map_err(|e| WorkflowError::GenerationFailure(e.to_string()))?;

        Ok(SectionTranslation {
            original_text: request.text.clone(),
            translated_text,
            confidence: PLACEHOLDER_CONFIDENCE,
            metadata: TranslationMetadata {
                model: self.generator.model().to_string(),
                context_size,
            },
        })
    }
}
