/*!
 * Document, section and run-input types shared by the workflow stages.
 */

use serde::{Deserialize, Serialize};

/// Media type families accepted for translation; `*` marks a prefix match
const SUPPORTED_MEDIA_TYPES: &[&str] = &[
    "text/*",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.*",
];

/// Whether a declared media type may enter the workflow
///
/// Parameters such as `; charset=utf-8` are ignored.
pub fn is_supported_media_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.is_empty() {
        return false;
    }

    SUPPORTED_MEDIA_TYPES.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => essence.starts_with(prefix) && essence.len() > prefix.len(),
        None => essence == *pattern,
    })
}

/// Document id for an object key: last path segment up to its first `.`
pub fn document_id_from_key(key: &str) -> String {
    let file_name = key.rsplit('/').next().unwrap_or_default();
    let stem = file_name.split('.').next().unwrap_or_default();

    if stem.is_empty() {
        "unknown".to_string()
    } else {
        stem.to_string()
    }
}

/// Payload a workflow run is started with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub document_id: String,
    /// RFC 3339 time the upload was observed
    pub timestamp: String,
}

impl RunInput {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, content_type: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            bucket: bucket.into(),
            document_id: document_id_from_key(&key),
            key,
            content_type: content_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A stored document accepted for translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub source_language: String,
    pub target_language: String,
}

/// A unit of translation; ids are unique and define document order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: u32,
    pub text: String,
}

impl Section {
    pub fn new(section_id: u32, text: impl Into<String>) -> Self {
        Self {
            section_id,
            text: text.into(),
        }
    }
}

/// Details reported alongside a section translation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationMetadata {
    pub model: String,
    /// Number of memory matches given to the model as context
    pub context_size: usize,
}

/// What the section translator returns for one section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTranslation {
    pub original_text: String,
    pub translated_text: String,
    pub confidence: f64,
    pub metadata: TranslationMetadata,
}

/// A translated section, as handed to the combiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedSection {
    pub section_id: u32,
    pub translated_text: String,
    /// In `0.0..=1.0`
    pub confidence: f64,
}

impl TranslatedSection {
    pub fn new(section_id: u32, translated_text: impl Into<String>, confidence: f64) -> Self {
        Self {
            section_id,
            translated_text: translated_text.into(),
            confidence,
        }
    }
}

/// The merged translation and where it was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedDocument {
    pub document_id: String,
    pub bucket: String,
    pub key: String,
    pub text: String,
    /// Arithmetic mean of section confidences; NaN for zero sections
    pub confidence: f64,
    pub source_language: String,
    pub target_language: String,
    pub section_count: usize,
}

/// Split a body into sections of at most `max_chars` characters
///
/// Paragraphs (separated by blank lines) are packed greedily and joined with
/// a blank line; a paragraph longer than `max_chars` becomes its own section.
/// Ids start at 1. Blank input yields no sections.
pub fn split_sections(body: &str, max_chars: usize) -> Vec<Section> {
    let normalized = body.replace("\r\n", "\n");
    let paragraphs = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for paragraph in paragraphs {
        let paragraph_chars = paragraph.chars().count();
        let joined_chars = current_chars + 2 + paragraph_chars;

        if !current.is_empty() && joined_chars > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if current.is_empty() {
            current.push_str(paragraph);
            current_chars = paragraph_chars;
        } else {
            current.push_str("\n\n");
            current.push_str(paragraph);
            current_chars += 2 + paragraph_chars;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .enumerate()
        .map(|(i, text)| Section::new(i as u32 + 1, text))
        .collect()
}
