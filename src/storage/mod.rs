/*!
 * Blob store abstraction.
 *
 * Documents, translation memory files and translated artifacts live in a
 * bucket/key addressed store. Two implementations are provided:
 * - `local`: one directory per bucket with JSON metadata sidecars
 * - `memory`: process-local map used by tests and dry runs
 */

use async_trait::async_trait;
use anyhow::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

pub mod local;
pub mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Metadata returned by a head request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Declared media type, if any
    pub content_type: Option<String>,

    /// Body size in bytes
    pub content_length: u64,

    /// User metadata tags (e.g. `source-language`)
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// RFC 3339 timestamp of the last write
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl ObjectMetadata {
    /// Look up a tag by name
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// A write request
#[derive(Debug, Clone)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub tags: BTreeMap<String, String>,
}

impl PutObject {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            body: body.into(),
            content_type: "application/octet-stream".to_string(),
            tags: BTreeMap::new(),
        }
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }
}

/// Common trait for bucket/key object stores
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Read an object's metadata without its body
    async fn head(&self, bucket: &str, key: &str) -> Result<ObjectMetadata>;

    /// Read an object's body
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Create or replace an object
    async fn put(&self, object: PutObject) -> Result<()>;

    /// Build a time-limited retrieval link for an object
    async fn presign_get(&self, bucket: &str, key: &str, expires_in: Duration) -> Result<String>;
}

/// Guess a media type from a key's extension, for objects written without one
pub fn guess_content_type(key: &str) -> Option<&'static str> {
    let extension = key.rsplit_once('.').map(|(_, ext)| ext.to_lowercase())?;

    match extension.as_str() {
        "txt" => Some("text/plain"),
        "md" => Some("text/markdown"),
        "html" | "htm" => Some("text/html"),
        "csv" => Some("text/csv"),
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
        "tmx" | "xml" => Some("application/xml"),
        _ => None,
    }
}
