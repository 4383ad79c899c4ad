/*!
 * Error types for the docflow workflow engine.
 *
 * Leaf tasks (validator, translator, combiner, notifier, dispatcher and the
 * bootstrap reconcilers) report a `WorkflowError`. The coordinator never
 * recovers from one locally: it records the error on the run and stops.
 */

use thiserror::Error;

/// Errors that can occur when talking to an external HTTP service
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

/// Failures a workflow stage can surface to the coordinator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    /// Declared media type is outside the supported families
    #[error("Unsupported file type: {0}")]
    UnsupportedMediaType(String),

    /// Reading an object or its metadata failed
    #[error("Storage read failed for {key}: {message}")]
    StorageReadFailure { key: String, message: String },

    /// Writing an object failed
    #[error("Storage write failed for {key}: {message}")]
    StorageWriteFailure { key: String, message: String },

    #[error("Embedding failed: {0}")]
    EmbeddingFailure(String),

    #[error("Similarity search failed: {0}")]
    SimilaritySearchFailure(String),

    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    /// A single section could not be translated; the cause is the leaf error
    #[error("Translation of section {section_id} failed: {cause}")]
    TranslationFailed {
        section_id: u32,
        cause: Box<WorkflowError>,
    },

    /// The translated set cannot be merged into a document
    #[error("Combine failed: {0}")]
    CombineFailure(String),

    #[error("Failed to start workflow run: {0}")]
    RunStartFailure(String),

    #[error("Notification failed: {0}")]
    NotificationFailure(String),

    #[error("Reconciliation failed: {0}")]
    ReconciliationFailure(String),

    /// A leaf exceeded its execution timeout
    #[error("Stage '{stage}' timed out after {timeout_secs}s")]
    LeafTimeout { stage: String, timeout_secs: u64 },

    /// The caller lacks the capability needed for an action
    #[error("Access denied: {principal} may not {action} on {resource}")]
    AccessDenied {
        principal: String,
        action: String,
        resource: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl WorkflowError {
    /// Wrap a leaf error as the failure of one section
    pub fn section(section_id: u32, cause: WorkflowError) -> Self {
        Self::TranslationFailed {
            section_id,
            cause: Box::new(cause),
        }
    }

    /// Short machine-friendly name, persisted alongside failed runs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType(_) => "UnsupportedMediaType",
            Self::StorageReadFailure { .. } => "StorageReadFailure",
            Self::StorageWriteFailure { .. } => "StorageWriteFailure",
            Self::EmbeddingFailure(_) => "EmbeddingFailure",
            Self::SimilaritySearchFailure(_) => "SimilaritySearchFailure",
            Self::GenerationFailure(_) => "GenerationFailure",
            Self::TranslationFailed { .. } => "TranslationFailed",
            Self::CombineFailure(_) => "CombineFailure",
            Self::RunStartFailure(_) => "RunStartFailure",
            Self::NotificationFailure(_) => "NotificationFailure",
            Self::ReconciliationFailure(_) => "ReconciliationFailure",
            Self::LeafTimeout { .. } => "LeafTimeout",
            Self::AccessDenied { .. } => "AccessDenied",
            Self::Configuration(_) => "Configuration",
        }
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a workflow stage
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
