/*!
 * Upload dispatcher.
 *
 * Turns upload notifications into workflow runs. Records of one event are
 * handled strictly in order and independently: a bad record is reported and
 * the next one is still dispatched.
 */

use log::{error, info, warn};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::document::{is_supported_media_type, RunInput};
use super::starter::{RunHandle, RunStarter, StartRunRequest};
use crate::bootstrap::FunctionConfigStore;
use crate::errors::WorkflowError;
use crate::storage::BlobStore;

/// Environment variable holding the workflow to start
pub const WORKFLOW_ID_VAR: &str = "WORKFLOW_ID";

/// Function name the dispatcher reads its environment under
pub const DISPATCHER_FUNCTION: &str = "upload-dispatcher";

/// One uploaded object; the key arrives URL-encoded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadEvent {
    #[serde(default)]
    pub records: Vec<UploadRecord>,
}

/// What happened to one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub bucket: String,
    /// Decoded key
    pub key: String,
    pub result: Result<RunHandle, WorkflowError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl DispatchReport {
    pub fn started(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.started()
    }
}

/// Decode an event key: `+` is a space, then percent-decoding
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

#[derive(Debug, Clone)]
pub struct UploadDispatcher {
    store: Arc<dyn BlobStore>,
    starter: Arc<dyn RunStarter>,
    functions: Arc<dyn FunctionConfigStore>,
    function_name: String,
}

impl UploadDispatcher {
    pub fn new(
        store: Arc<dyn BlobStore>,
        starter: Arc<dyn RunStarter>,
        functions: Arc<dyn FunctionConfigStore>,
    ) -> Self {
        Self {
            store,
            starter,
            functions,
            function_name: DISPATCHER_FUNCTION.to_string(),
        }
    }

    /// Read the environment of another function name
    pub fn with_function_name(mut self, function_name: impl Into<String>) -> Self {
        self.function_name = function_name.into();
        self
    }

    async fn workflow_id(&self) -> Result<String, WorkflowError> {
        let environment = self
            .functions
            .get_environment(&self.function_name)
            .await
            .map_err(|e| WorkflowError::RunStartFailure(format!("{:#}", e)))?;

        environment
            .and_then(|env| env.get(WORKFLOW_ID_VAR).cloned())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                WorkflowError::RunStartFailure(format!(
                    "{} is not set for function '{}'",
                    WORKFLOW_ID_VAR, self.function_name
                ))
            })
    }

    /// Dispatch every record of `event` in order
    pub async fn dispatch(&self, event: &UploadEvent) -> DispatchReport {
        let workflow_id = self.workflow_id().await;
        if let Err(e) = &workflow_id {
            error!("Cannot start runs: {}", e);
        }

        let mut report = DispatchReport::default();
        for record in &event.records {
            let key = decode_key(&record.key);
            let result = match &workflow_id {
                Ok(workflow_id) => self.dispatch_record(workflow_id, &record.bucket, &key).await,
                Err(e) => Err(e.clone()),
            };

            if let Err(e) = &result {
                warn!("Skipping {}/{}: {}", record.bucket, key, e);
            }
            report.outcomes.push(RecordOutcome {
                bucket: record.bucket.clone(),
                key,
                result,
            });
        }

        info!(
            "Dispatched {} records: {} started, {} failed",
            report.outcomes.len(),
            report.started(),
            report.failed()
        );
        report
    }

    async fn dispatch_record(&self, workflow_id: &str, bucket: &str, key: &str) -> Result<RunHandle, WorkflowError> {
        let metadata = self
            .store
            .head(bucket, key)
            .await
            .map_err(|e| WorkflowError::StorageReadFailure {
                key: key.to_string(),
                message: format!("{:#}", e),
            })?;

        let content_type = metadata.content_type.unwrap_or_default();
        if !is_supported_media_type(&content_type) {
            return Err(WorkflowError::UnsupportedMediaType(content_type));
        }

        let input = RunInput::new(bucket, key, content_type.as_str());
        let handle = self
            .starter
            .start(StartRunRequest {
                workflow_id: workflow_id.to_string(),
                input,
            })
            .await
            .map_err(|e| match e {
                WorkflowError::RunStartFailure(_) => e,
                other => WorkflowError::RunStartFailure(other.to_string()),
            })?;

        info!("Started translation run {} for {}/{} ({})", handle.run_id, bucket, key, content_type);
        Ok(handle)
    }
}
