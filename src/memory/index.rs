use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::Arc;

use super::{MemoryEntry, SearchHit, SimilarityIndex};
use crate::database::models::MemoryRecord;
use crate::database::Repository;

/// Cosine similarity of two vectors; 0.0 when lengths differ or either is zero
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score every candidate and keep the `k` best, highest first
fn rank<'a, I>(candidates: I, vector: &[f32], k: usize) -> Vec<SearchHit>
where
    I: Iterator<Item = (&'a str, &'a str, &'a [f32])>,
{
    let mut hits: Vec<SearchHit> = candidates
        .map(|(source, translation, embedding)| SearchHit {
            source_text: source.to_string(),
            translation: Some(translation.to_string()),
            score: cosine_similarity(vector, embedding),
        })
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    hits.truncate(k);
    hits
}

/// Process-local index
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryIndex {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let entries = self.entries.read();
        Ok(rank(
            entries
                .iter()
                .map(|e| (e.source_text.as_str(), e.translation.as_str(), e.embedding.as_slice())),
            vector,
            k,
        ))
    }

    async fn upsert(&self, new_entries: Vec<MemoryEntry>) -> Result<usize> {
        let count = new_entries.len();
        let mut entries = self.entries.write();

        for entry in new_entries {
            let existing = entries.iter_mut().find(|e| {
                e.source_text == entry.source_text
                    && e.source_language == entry.source_language
                    && e.target_language == entry.target_language
            });
            match existing {
                Some(slot) => *slot = entry,
                None => entries.push(entry),
            }
        }

        Ok(count)
    }
}

/// Index persisted in the `memory_entries` table of one collection
///
/// Vectors are scanned linearly; the collection is expected to fit in memory.
#[derive(Debug, Clone)]
pub struct SqliteMemoryIndex {
    repository: Repository,
    collection: String,
}

impl SqliteMemoryIndex {
    pub fn new(repository: Repository, collection: impl Into<String>) -> Self {
        Self {
            repository,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl SimilarityIndex for SqliteMemoryIndex {
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let records = self.repository.load_memory_entries(&self.collection).await?;
        debug!("Scoring {} entries of collection '{}'", records.len(), self.collection);

        Ok(rank(
            records
                .iter()
                .map(|r| (r.source_text.as_str(), r.translation.as_str(), r.embedding.as_slice())),
            vector,
            k,
        ))
    }

    async fn upsert(&self, entries: Vec<MemoryEntry>) -> Result<usize> {
        let records = entries
            .into_iter()
            .map(|entry| {
                let record = MemoryRecord::new(
                    &self.collection,
                    entry.source_text,
                    entry.translation,
                    entry.source_language,
                    entry.target_language,
                    entry.embedding,
                );
                match entry.origin {
                    Some(origin) => record.with_origin(origin),
                    None => record,
                }
            })
            .collect();

        self.repository.upsert_memory_entries(records).await
    }
}
