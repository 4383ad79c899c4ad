/*!
 * Database entity models.
 *
 * These structures map directly to database tables and provide
 * type-safe access to persisted data.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle state of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run accepted, nothing executed yet
    Started,
    /// Content-type gate and section splitting
    Validating,
    /// Section fan-out in progress
    Translating,
    /// Merging translated sections
    Combining,
    /// Sending the completion notice
    Notifying,
    /// Terminal success
    Completed,
    /// Terminal failure, reachable from any non-terminal state
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (Completed, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Started, Validating) => true,
            (Validating, Translating) => true,
            (Translating, Combining) => true,
            (Combining, Notifying) | (Combining, Completed) => true,
            (Notifying, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Started => write!(f, "started"),
            RunState::Validating => write!(f, "validating"),
            RunState::Translating => write!(f, "translating"),
            RunState::Combining => write!(f, "combining"),
            RunState::Notifying => write!(f, "notifying"),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "started" => Ok(RunState::Started),
            "validating" => Ok(RunState::Validating),
            "translating" => Ok(RunState::Translating),
            "combining" => Ok(RunState::Combining),
            "notifying" => Ok(RunState::Notifying),
            "completed" => Ok(RunState::Completed),
            "failed" => Ok(RunState::Failed),
            _ => Err(anyhow::anyhow!("Invalid run state: {}", s)),
        }
    }
}

/// Workflow run record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier (UUID v4)
    pub id: String,
    pub document_id: String,
    pub bucket: String,
    pub object_key: String,
    pub content_type: String,
    pub state: RunState,
    /// Sections produced by validation
    pub section_count: i64,
    /// Sections translated so far
    pub translated_count: i64,
    /// Key of the combined artifact, once written
    pub output_key: Option<String>,
    /// Aggregate confidence; `None` when undefined (zero sections)
    pub confidence: Option<f64>,
    /// Error kind of the failure that terminated the run
    pub failure_kind: Option<String>,
    pub failure_reason: Option<String>,
    /// Creation timestamp (RFC 3339)
    pub started_at: String,
    pub updated_at: String,
    pub finished_at: Option<String>,
}

impl RunRecord {
    /// Create a record in the `Started` state
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        bucket: impl Into<String>,
        object_key: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: id.into(),
            document_id: document_id.into(),
            bucket: bucket.into(),
            object_key: object_key.into(),
            content_type: content_type.into(),
            state: RunState::Started,
            section_count: 0,
            translated_count: 0,
            output_key: None,
            confidence: None,
            failure_kind: None,
            failure_reason: None,
            started_at: now.clone(),
            updated_at: now,
            finished_at: None,
        }
    }
}

/// Translation memory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Database ID (None for new records)
    pub id: Option<i64>,
    /// Similarity collection the entry belongs to
    pub collection: String,
    pub source_text: String,
    pub translation: String,
    pub source_language: String,
    pub target_language: String,
    pub embedding: Vec<f32>,
    /// Key of the TMX file the entry came from
    pub origin: Option<String>,
    pub created_at: String,
}

impl MemoryRecord {
    pub fn new(
        collection: impl Into<String>,
        source_text: impl Into<String>,
        translation: impl Into<String>,
        source_language: impl Into<String>,
        target_language: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: None,
            collection: collection.into(),
            source_text: source_text.into(),
            translation: translation.into(),
            source_language: source_language.into(),
            target_language: target_language.into(),
            embedding,
            origin: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Serialize an embedding as little-endian f32 bytes
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Inverse of [`encode_embedding`]; trailing partial chunks are ignored
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Inline policy attached to a role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub role_name: String,
    pub policy_name: String,
    /// Policy document as JSON
    pub document: String,
    pub updated_at: String,
}

/// Environment of a deployed function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionConfigRecord {
    pub function_name: String,
    pub environment: BTreeMap<String, String>,
    pub updated_at: String,
}
