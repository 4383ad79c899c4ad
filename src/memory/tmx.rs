/*!
 * TMX (Translation Memory eXchange) ingestion.
 *
 * Each `<tu>` with at least two `<tuv>` variants yields one unit: the first
 * variant is the source, the second the target. Inline markup inside `<seg>`
 * is dropped and XML entities are unescaped.
 */

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{MemoryEntry, SimilarityIndex};
use crate::errors::WorkflowError;
use crate::providers::EmbeddingProvider;
use crate::storage::BlobStore;

static TU_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<tu\b[^>]*>(.*?)</tu>").unwrap());

static TUV_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<tuv\b([^>]*)>(.*?)</tuv>").unwrap());

static SEG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<seg\b[^>]*>(.*?)</seg>").unwrap());

static LANG_ATTR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:xml:lang|lang)\s*=\s*["']([^"']+)["']"#).unwrap());

static SRCLANG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<header\b[^>]*\bsrclang\s*=\s*["']([^"']+)["']"#).unwrap());

/// Paired and placeholder codes whose content is native markup, not text
static NATIVE_CODE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<(?:bpt|ept|ph|it)\b[^>]*>.*?</(?:bpt|ept|ph|it)>").unwrap());

static INLINE_TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());

/// One aligned source/target pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationUnit {
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub source_text: String,
    pub target_text: String,
}

/// Result of ingesting one TMX object
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub units: usize,
    pub stored: usize,
}

/// Replace XML entities with the characters they name
pub fn unescape_xml(text: &str) -> String {
    ENTITY_REGEX
        .replace_all(text, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "amp" => Some('&'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ if entity.starts_with("#x") => u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32),
                _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn segment_text(raw: &str) -> String {
    let without_codes = NATIVE_CODE_REGEX.replace_all(raw, "");
    let without_markup = INLINE_TAG_REGEX.replace_all(&without_codes, "");
    unescape_xml(without_markup.trim())
}

/// Parse a TMX document into translation units
///
/// Units with fewer than two variants or an empty source segment are skipped.
pub fn parse_tmx(content: &str) -> Vec<TranslationUnit> {
    let header_language = SRCLANG_REGEX
        .captures(content)
        .map(|caps| caps[1].to_string())
        .filter(|lang| !lang.eq_ignore_ascii_case("*all*"));

    let mut units = Vec::new();
    for tu in TU_REGEX.captures_iter(content) {
        let variants: Vec<(Option<String>, String)> = TUV_REGEX
            .captures_iter(&tu[1])
            .filter_map(|tuv| {
                let language = LANG_ATTR_REGEX.captures(&tuv[1]).map(|c| c[1].to_string());
                let text = SEG_REGEX.captures(&tuv[2]).map(|c| segment_text(&c[1]))?;
                Some((language, text))
            })
            .collect();

        if variants.len() < 2 || variants[0].1.is_empty() {
            continue;
        }

        let (source_language, source_text) = variants[0].clone();
        let (target_language, target_text) = variants[1].clone();
        units.push(TranslationUnit {
            source_language: source_language.or_else(|| header_language.clone()),
            target_language,
            source_text,
            target_text,
        });
    }

    units
}

/// Read a TMX object, embed every source segment and store the pairs
///
/// `default_languages` fills in variants that carry no language attribute.
pub async fn ingest_tmx(
    store: &dyn BlobStore,
    bucket: &str,
    key: &str,
    embedder: &dyn EmbeddingProvider,
    index: &dyn SimilarityIndex,
    default_languages: (&str, &str),
) -> Result<IngestReport, WorkflowError> {
    let body = store.get(bucket, key).await.map_err(|e| WorkflowError::StorageReadFailure {
        key: key.to_string(),
        message: e.to_string(),
    })?;

    let content = String::from_utf8_lossy(&body);
    if content.trim().is_empty() {
        return Err(WorkflowError::StorageReadFailure {
            key: key.to_string(),
            message: "Empty TMX file".to_string(),
        });
    }

    let units = parse_tmx(&content);
    if units.is_empty() {
        warn!("No translation units found in {}/{}", bucket, key);
        return Ok(IngestReport::default());
    }

    let mut entries = Vec::with_capacity(units.len());
    for unit in &units {
        let embedding = embedder
            .embed(&unit.source_text)
            .await
            .map_err(|e| WorkflowError::EmbeddingFailure(e.to_string()))?;

        entries.push(MemoryEntry {
            source_text: unit.source_text.clone(),
            translation: unit.target_text.clone(),
            source_language: unit.source_language.clone().unwrap_or_else(|| default_languages.0.to_string()),
            target_language: unit.target_language.clone().unwrap_or_else(|| default_languages.1.to_string()),
            embedding,
            origin: Some(key.to_string()),
        });
    }

    let stored = index
        .upsert(entries)
        .await
        .map_err(|e| WorkflowError::StorageWriteFailure {
            key: key.to_string(),
            message: e.to_string(),
        })?;

    info!("Ingested {} translation units from {}/{}", stored, bucket, key);
    Ok(IngestReport {
        units: units.len(),
        stored,
    })
}
