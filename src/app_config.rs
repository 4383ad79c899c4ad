/*!
 * Deployment configuration: bucket names, model identifiers, the index
 * collection, coordinator limits and the optional notification sender.
 */

use anyhow::{anyhow, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::default::Default;
use std::path::PathBuf;
use std::time::Duration;

/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Blob store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding and generation model settings
    #[serde(default)]
    pub models: ModelConfig,

    /// Similarity index settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Coordinator settings
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// E-mail notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Generation backend type
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    #[default]
    Ollama,
    Anthropic,
}

impl GenerationBackend {
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::Anthropic => "Anthropic",
        }
    }
}

impl std::fmt::Display for GenerationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

impl std::str::FromStr for GenerationBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(anyhow!("Invalid generation backend: {}", s)),
        }
    }
}

/// Blob store configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Root directory holding one sub-directory per bucket
    #[serde(default = "default_storage_root")]
    pub root_dir: PathBuf,

    /// Bucket receiving documents to translate
    #[serde(default = "default_documents_bucket")]
    pub documents_bucket: String,

    /// Bucket receiving TMX translation memory files
    #[serde(default = "default_tmx_bucket")]
    pub tmx_bucket: String,

    /// Secret used to sign retrieval links
    #[serde(default = "String::new")]
    pub signing_secret: String,

    /// Validity of retrieval links in seconds (7 days)
    #[serde(default = "default_link_expiry_secs")]
    pub link_expiry_secs: u64,
}

impl StorageConfig {
    pub fn link_expiry(&self) -> Duration {
        Duration::from_secs(self.link_expiry_secs)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_storage_root(),
            documents_bucket: default_documents_bucket(),
            tmx_bucket: default_tmx_bucket(),
            signing_secret: String::new(),
            link_expiry_secs: default_link_expiry_secs(),
        }
    }
}

/// Model configuration shared by the embedding and generation clients
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelConfig {
    /// Generation backend to use
    #[serde(default)]
    pub backend: GenerationBackend,

    /// Embedding model identifier
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Translation (generation) model identifier
    #[serde(default = "default_translation_model")]
    pub translation_model: String,

    /// Service URL for the generation backend
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Service URL for the embedding service (Ollama compatible)
    #[serde(default = "default_ollama_endpoint")]
    pub embedding_endpoint: String,

    /// API key (required for Anthropic)
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum number of tokens to generate per section
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::default(),
            embedding_model: default_embedding_model(),
            translation_model: default_translation_model(),
            endpoint: String::new(),
            embedding_endpoint: default_ollama_endpoint(),
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Endpoint of the generation backend, falling back to its public default
    pub fn generation_endpoint(&self) -> String {
        if !self.endpoint.is_empty() {
            return self.endpoint.clone();
        }

        match self.backend {
            GenerationBackend::Ollama => default_ollama_endpoint(),
            GenerationBackend::Anthropic => default_anthropic_endpoint(),
        }
    }
}

/// Similarity index configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SearchConfig {
    /// Collection (index) holding prior translations
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Number of nearest neighbours requested per section
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Hits must score strictly above this to become context
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// SQLite database holding the index, runs and bootstrap state
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            collection_name: default_collection_name(),
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            database_path: None,
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkflowConfig {
    /// Maximum translator invocations in flight per run
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Execution timeout of each leaf task in seconds
    #[serde(default = "default_leaf_timeout_secs")]
    pub leaf_timeout_secs: u64,

    /// Execution timeout of bootstrap reconciliation actions in seconds
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,

    /// Source language when the document carries no `source-language` tag
    #[serde(default = "default_source_language")]
    pub default_source_language: String,

    /// Target language when the document carries no `target-language` tag
    #[serde(default = "default_target_language")]
    pub default_target_language: String,

    /// Upper bound of characters packed into one section
    #[serde(default = "default_max_section_chars")]
    pub max_section_chars: usize,

    /// Identity runs are started under
    #[serde(default = "default_workflow_id")]
    pub workflow_id: String,

    /// Role the upload dispatcher acts as
    #[serde(default = "default_dispatcher_role")]
    pub dispatcher_role: String,

    /// Role the coordinator acts as
    #[serde(default = "default_coordinator_role")]
    pub coordinator_role: String,

    /// Check granted capabilities before starting runs and invoking tasks
    #[serde(default)]
    pub enforce_permissions: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            leaf_timeout_secs: default_leaf_timeout_secs(),
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
            default_source_language: default_source_language(),
            default_target_language: default_target_language(),
            max_section_chars: default_max_section_chars(),
            workflow_id: default_workflow_id(),
            dispatcher_role: default_dispatcher_role(),
            coordinator_role: default_coordinator_role(),
            enforce_permissions: false,
        }
    }
}

impl WorkflowConfig {
    pub fn leaf_timeout(&self) -> Duration {
        Duration::from_secs(self.leaf_timeout_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}

/// E-mail notification configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Whether the Notify stage is part of the workflow
    #[serde(default)]
    pub enabled: bool,

    /// Sender identity; required when enabled
    #[serde(default)]
    pub sender_email: Option<String>,

    /// Recipient used when the document carries no `notify-email` tag
    #[serde(default)]
    pub default_recipient: Option<String>,

    /// Mail webhook; when empty, messages are written to the outbox directory
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Directory used by the file outbox
    #[serde(default = "default_outbox_dir")]
    pub outbox_dir: PathBuf,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sender_email: None,
            default_recipient: None,
            webhook_url: None,
            outbox_dir: default_outbox_dir(),
        }
    }
}

impl NotificationConfig {
    /// Sender identity, present only when notifications are active
    pub fn active_sender(&self) -> Option<&str> {
        if self.enabled {
            self.sender_email.as_deref().filter(|s| !s.is_empty())
        } else {
            None
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("./data/buckets")
}

fn default_link_expiry_secs() -> u64 {
    604_800
}

fn default_documents_bucket() -> String {
    "translation-memory-docs".to_string()
}

fn default_tmx_bucket() -> String {
    "translation-memory-tmx".to_string()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_translation_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_http_timeout_secs() -> u64 {
    120
}

fn default_collection_name() -> String {
    "translation-memory".to_string()
}

fn default_top_k() -> usize {
    5
}

fn default_similarity_threshold() -> f32 {
    0.8
}

fn default_max_concurrency() -> usize {
    5
}

fn default_leaf_timeout_secs() -> u64 {
    30
}

fn default_reconcile_timeout_secs() -> u64 {
    60
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "es".to_string()
}

fn default_max_section_chars() -> usize {
    2000
}

fn default_workflow_id() -> String {
    "document-translation".to_string()
}

fn default_dispatcher_role() -> String {
    "roles/upload-dispatcher".to_string()
}

fn default_coordinator_role() -> String {
    "roles/workflow-coordinator".to_string()
}

fn default_outbox_dir() -> PathBuf {
    PathBuf::from("./data/outbox")
}

impl Config {
    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.storage.documents_bucket.trim().is_empty() {
            return Err(anyhow!("Documents bucket name must not be empty"));
        }
        if self.storage.tmx_bucket.trim().is_empty() {
            return Err(anyhow!("TMX bucket name must not be empty"));
        }
        if self.models.embedding_model.trim().is_empty() {
            return Err(anyhow!("Embedding model identifier must not be empty"));
        }
        if self.models.translation_model.trim().is_empty() {
            return Err(anyhow!("Translation model identifier must not be empty"));
        }
        if self.search.collection_name.trim().is_empty() {
            return Err(anyhow!("Search collection name must not be empty"));
        }
        if self.search.top_k == 0 {
            return Err(anyhow!("Search top_k must be at least 1"));
        }
        if self.workflow.max_concurrency == 0 {
            return Err(anyhow!("Workflow max_concurrency must be at least 1"));
        }
        if self.storage.link_expiry_secs == 0 {
            return Err(anyhow!("Retrieval link expiry must be at least one second"));
        }
        if self.workflow.max_section_chars == 0 {
            return Err(anyhow!("Workflow max_section_chars must be at least 1"));
        }
        if self.workflow.workflow_id.trim().is_empty() {
            return Err(anyhow!("Workflow id must not be empty"));
        }

        crate::language_utils::get_language_name(&self.workflow.default_source_language)?;
        crate::language_utils::get_language_name(&self.workflow.default_target_language)?;

        if self.models.backend == GenerationBackend::Anthropic && self.models.api_key.is_empty() {
            return Err(anyhow!("API key is required for the Anthropic backend"));
        }

        if self.notifications.enabled && self.notifications.active_sender().is_none() {
            return Err(anyhow!(
                "Email notifications are enabled but no sender email is configured"
            ));
        }

        Ok(())
    }

    /// Apply the deployment environment variables on top of the file values
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("TMX_BUCKET_NAME") {
            debug!("Overriding tmx bucket from environment");
            self.storage.tmx_bucket = value;
        }
        if let Some(value) = lookup("DOCUMENTS_BUCKET_NAME") {
            debug!("Overriding documents bucket from environment");
            self.storage.documents_bucket = value;
        }
        if let Some(value) = lookup("EMBEDDING_MODEL") {
            self.models.embedding_model = value;
        }
        if let Some(value) = lookup("TRANSLATION_MODEL") {
            self.models.translation_model = value;
        }
        if let Some(value) = lookup("SEARCH_COLLECTION_NAME") {
            self.search.collection_name = value;
        }
        if let Some(value) = lookup("ENABLE_EMAIL_NOTIFICATIONS") {
            self.notifications.enabled = value == "true";
        }
        if let Some(value) = lookup("SENDER_EMAIL") {
            self.notifications.sender_email = Some(value);
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            storage: StorageConfig::default(),
            models: ModelConfig::default(),
            search: SearchConfig::default(),
            workflow: WorkflowConfig::default(),
            notifications: NotificationConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_generationBackend_fromStr_shouldParseKnownValues() {
        assert_eq!("ollama".parse::<GenerationBackend>().unwrap(), GenerationBackend::Ollama);
        assert_eq!("Anthropic".parse::<GenerationBackend>().unwrap(), GenerationBackend::Anthropic);
        assert!("bedrock".parse::<GenerationBackend>().is_err());
    }

    #[test]
    fn test_applyOverrides_shouldReplaceNamedOptions() {
        let vars: HashMap<&str, &str> = [
            ("TMX_BUCKET_NAME", "tmx-override"),
            ("ENABLE_EMAIL_NOTIFICATIONS", "true"),
            ("SENDER_EMAIL", "noreply@example.com"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.storage.tmx_bucket, "tmx-override");
        assert_eq!(config.storage.documents_bucket, "translation-memory-docs");
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.active_sender(), Some("noreply@example.com"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_activeSender_whenDisabled_shouldBeNone() {
        let config = NotificationConfig {
            enabled: false,
            sender_email: Some("noreply@example.com".to_string()),
            ..Default::default()
        };
        assert!(config.active_sender().is_none());
    }
}
