/*!
 * Translation memory.
 *
 * Previously translated segments are stored with the embedding of their
 * source text. The section translator queries the index with the embedding
 * of the text being translated and feeds close matches to the model as
 * context.
 *
 * - `index`: the `SimilarityIndex` trait's SQLite and in-memory backends
 * - `tmx`: TMX parsing and ingestion into an index
 */

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

pub mod index;
pub mod tmx;

pub use index::{cosine_similarity, InMemoryIndex, SqliteMemoryIndex};

/// A unit stored in the translation memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub source_text: String,
    pub translation: String,
    pub source_language: String,
    pub target_language: String,
    pub embedding: Vec<f32>,
    /// Where the entry came from, usually a TMX object key
    pub origin: Option<String>,
}

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub source_text: String,
    /// Stored translation; entries written by other tools may lack one
    pub translation: Option<String>,
    /// Cosine similarity to the query vector, higher is closer
    pub score: f32,
}

impl SearchHit {
    /// The translation, if present and non-empty
    pub fn usable_translation(&self) -> Option<&str> {
        self.translation.as_deref().filter(|t| !t.is_empty())
    }
}

/// Vector similarity search over the translation memory
#[async_trait]
pub trait SimilarityIndex: Send + Sync + Debug {
    /// Up to `k` nearest entries, best first
    async fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Insert entries, replacing any with the same source text and language pair
    async fn upsert(&self, entries: Vec<MemoryEntry>) -> Result<usize>;
}
