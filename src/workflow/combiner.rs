/*!
 * Document combiner.
 *
 * Merges translated sections back into one document in section order and
 * writes it to the documents bucket under `translated/`.
 */

use bytes::Bytes;
use log::{info, warn};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use super::document::{CombinedDocument, Document, TranslatedSection};
use crate::errors::WorkflowError;
use crate::storage::{BlobStore, PutObject};

/// Content type of the combined translation
pub const COMBINED_CONTENT_TYPE: &str = "text/plain";

/// Output key of a document's translation into `target_language`
pub fn output_key(document_id: &str, target_language: &str) -> String {
    format!("translated/{}_{}.txt", document_id, target_language)
}

/// Sections sorted by id and joined by a blank line
///
/// Fails when a section id occurs more than once.
pub fn merge_sections(mut sections: Vec<TranslatedSection>) -> Result<String, WorkflowError> {
    let mut seen = HashSet::with_capacity(sections.len());
    if let Some(duplicate) = sections.iter().find(|s| !seen.insert(s.section_id)) {
        return Err(WorkflowError::CombineFailure(format!(
            "Section {} was translated more than once",
            duplicate.section_id
        )));
    }

    sections.sort_by_key(|s| s.section_id);
    let texts: Vec<&str> = sections.iter().map(|s| s.translated_text.as_str()).collect();
    Ok(texts.join("\n\n"))
}

/// Fails unless `translated` covers exactly the ids in `expected`
pub fn ensure_all_sections(
    expected: impl IntoIterator<Item = u32>,
    translated: &[TranslatedSection],
) -> Result<(), WorkflowError> {
    let expected: BTreeSet<u32> = expected.into_iter().collect();
    let actual: BTreeSet<u32> = translated.iter().map(|s| s.section_id).collect();

    let missing: Vec<String> = expected.difference(&actual).map(u32::to_string).collect();
    if !missing.is_empty() {
        return Err(WorkflowError::CombineFailure(format!(
            "Missing translations for sections {}",
            missing.join(", ")
        )));
    }
    if let Some(unknown) = actual.difference(&expected).next() {
        return Err(WorkflowError::CombineFailure(format!("Section {} is not part of the document", unknown)));
    }
    Ok(())
}

/// Arithmetic mean of the section confidences; NaN for no sections
pub fn mean_confidence(sections: &[TranslatedSection]) -> f64 {
    let total: f64 = sections.iter().map(|s| s.confidence).sum();
    total / sections.len() as f64
}

#[derive(Debug, Clone)]
pub struct DocumentCombiner {
    store: Arc<dyn BlobStore>,
}

impl DocumentCombiner {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Merge `sections` and persist the result next to the source document
    pub async fn combine(
        &self,
        document: &Document,
        sections: Vec<TranslatedSection>,
    ) -> Result<CombinedDocument, WorkflowError> {
        let section_count = sections.len();
        let confidence = mean_confidence(&sections);
        let text = merge_sections(sections)?;
        let key = output_key(&document.document_id, &document.target_language);

        if section_count == 0 {
            warn!("Combining '{}' with no sections", document.document_id);
        }

        let object = PutObject::new(&document.bucket, &key, Bytes::from(text.clone()))
            .content_type(COMBINED_CONTENT_TYPE)
            .tag("source-language", &document.source_language)
            .tag("target-language", &document.target_language)
            .tag("confidence-score", confidence.to_string())
            .tag("original-document", &document.key);

        self.store
            .put(object)
            .await
            .map_err(|e| WorkflowError::StorageWriteFailure {
                key: key.clone(),
                message: format!("{:#}", e),
            })?;

        info!(
            "Combined {} sections of '{}' into {}/{} (confidence {:.3})",
            section_count, document.document_id, document.bucket, key, confidence
        );

        Ok(CombinedDocument {
            document_id: document.document_id.clone(),
            bucket: document.bucket.clone(),
            key,
            text,
            confidence,
            source_language: document.source_language.clone(),
            target_language: document.target_language.clone(),
            section_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn document(id: &str) -> Document {
        Document {
            document_id: id.to_string(),
            bucket: "docs".to_string(),
            key: format!("{}.txt", id),
            content_type: "text/plain".to_string(),
            source_language: "en".to_string(),
            target_language: "es".to_string(),
        }
    }

    #[tokio::test]
    async fn test_combine_shouldOrderSectionsAndAverageConfidence() {
        let store = MemoryBlobStore::new();
        let combiner = DocumentCombiner::new(Arc::new(store.clone()));
        let sections = vec![
            TranslatedSection::new(2, "Section 2", 0.90),
            TranslatedSection::new(1, "Section 1", 0.95),
        ];

        let combined = combiner.combine(&document("doc123"), sections).await.unwrap();

        assert_eq!(combined.key, "translated/doc123_es.txt");
        assert_eq!(combined.text, "Section 1\n\nSection 2");
        assert!((combined.confidence - 0.925).abs() < 1e-9);
        assert_eq!(combined.section_count, 2);
        assert_eq!(
            store.text("docs", "translated/doc123_es.txt").as_deref(),
            Some("Section 1\n\nSection 2")
        );

        let metadata = store.metadata("docs", "translated/doc123_es.txt").unwrap();
        assert_eq!(metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(metadata.tag("source-language"), Some("en"));
        assert_eq!(metadata.tag("target-language"), Some("es"));
        assert_eq!(metadata.tag("original-document"), Some("doc123.txt"));
        assert!(metadata.tag("confidence-score").unwrap().starts_with("0.92"));
    }

    #[tokio::test]
    async fn test_combine_withNoSections_shouldWriteEmptyDocument() {
        let store = MemoryBlobStore::new();
        let combiner = DocumentCombiner::new(Arc::new(store.clone()));

        let combined = combiner.combine(&document("docEmpty123"), Vec::new()).await.unwrap();

        assert_eq!(combined.key, "translated/docEmpty123_es.txt");
        assert_eq!(combined.text, "");
        assert!(combined.confidence.is_nan());
        assert_eq!(combined.section_count, 0);
        assert_eq!(store.text("docs", "translated/docEmpty123_es.txt").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_combine_withFailingStore_shouldReportWriteFailure() {
        let store = MemoryBlobStore::new();
        store.fail_writes(true);
        let combiner = DocumentCombiner::new(Arc::new(store));

        let result = combiner
            .combine(&document("doc1"), vec![TranslatedSection::new(1, "a", 0.9)])
            .await;

        assert!(matches!(result, Err(WorkflowError::StorageWriteFailure { .. })));
    }

    #[test]
    fn test_mergeSections_withDuplicateIds_shouldFail() {
        let sections = vec![TranslatedSection::new(1, "a", 0.9), TranslatedSection::new(1, "b", 0.9)];

        assert!(matches!(merge_sections(sections), Err(WorkflowError::CombineFailure(_))));
    }

    #[test]
    fn test_mergeSections_shouldIgnoreArrivalOrder() {
        let sections = vec![
            TranslatedSection::new(3, "c", 1.0),
            TranslatedSection::new(1, "a", 1.0),
            TranslatedSection::new(2, "b", 1.0),
        ];

        assert_eq!(merge_sections(sections).unwrap(), "a\n\nb\n\nc");
    }

    #[test]
    fn test_ensureAllSections_withMissingId_shouldFail() {
        let translated = vec![TranslatedSection::new(1, "a", 0.9), TranslatedSection::new(3, "c", 0.9)];

        match ensure_all_sections([1, 2, 3], &translated) {
            Err(WorkflowError::CombineFailure(message)) => assert!(message.contains('2')),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_ensureAllSections_withUnknownId_shouldFail() {
        let translated = vec![TranslatedSection::new(1, "a", 0.9), TranslatedSection::new(7, "x", 0.9)];

        assert!(matches!(
            ensure_all_sections([1], &translated),
            Err(WorkflowError::CombineFailure(_))
        ));
    }

    #[test]
    fn test_ensureAllSections_withMatchingIds_shouldPass() {
        let translated = vec![TranslatedSection::new(2, "b", 0.9), TranslatedSection::new(1, "a", 0.9)];

        assert!(ensure_all_sections([1, 2], &translated).is_ok());
        assert!(ensure_all_sections(Vec::new(), &[]).is_ok());
    }
}
