/*!
 * Environment injection into a deployed function's configuration.
 */

use anyhow::Result;
use async_trait::async_trait;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use super::{reconcile_with_timeout, ReconcileOutcome, RequestType};
use crate::database::Repository;
use crate::errors::WorkflowError;

/// Per-function environment variables
#[async_trait]
pub trait FunctionConfigStore: Send + Sync + Debug {
    /// Replace the whole environment of `function`
    async fn put_environment(&self, function: &str, environment: &BTreeMap<String, String>) -> Result<()>;

    /// Environment of `function`, `None` when it was never configured
    async fn get_environment(&self, function: &str) -> Result<Option<BTreeMap<String, String>>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFunctionConfigStore {
    functions: Arc<RwLock<HashMap<String, BTreeMap<String, String>>>>,
}

impl MemoryFunctionConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FunctionConfigStore for MemoryFunctionConfigStore {
    async fn put_environment(&self, function: &str, environment: &BTreeMap<String, String>) -> Result<()> {
        self.functions.write().insert(function.to_string(), environment.clone());
        Ok(())
    }

    async fn get_environment(&self, function: &str) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self.functions.read().get(function).cloned())
    }
}

/// Function configuration backed by the `function_configs` table
#[derive(Debug, Clone)]
pub struct SqliteFunctionConfigStore {
    repository: Repository,
}

impl SqliteFunctionConfigStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl FunctionConfigStore for SqliteFunctionConfigStore {
    async fn put_environment(&self, function: &str, environment: &BTreeMap<String, String>) -> Result<()> {
        self.repository.put_function_environment(function, environment).await
    }

    async fn get_environment(&self, function: &str) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self
            .repository
            .get_function_config(function)
            .await?
            .map(|record| record.environment))
    }
}

/// Inputs of the injection action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvProperties {
    pub function_name: String,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct EnvInjection {
    store: Arc<dyn FunctionConfigStore>,
    timeout: Duration,
}

impl EnvInjection {
    pub fn new(store: Arc<dyn FunctionConfigStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Create/Update replace the function's environment; Delete leaves it alone
    pub async fn reconcile(&self, request: RequestType, properties: &EnvProperties) -> ReconcileOutcome {
        let function = properties.function_name.as_str();
        let physical_id = format!("{}-env-updater", function);

        let work = async {
            if function.trim().is_empty() {
                return Err(WorkflowError::ReconciliationFailure("Function name is required".to_string()));
            }

            match request {
                RequestType::Create | RequestType::Update => {
                    self.store
                        .put_environment(function, &properties.environment)
                        .await
                        .map_err(|e| WorkflowError::ReconciliationFailure(format!("{:#}", e)))?;
                    info!("Updated {} environment variables for {}", properties.environment.len(), function);
                    Ok(ReconcileOutcome::success(
                        physical_id.as_str(),
                        format!("Successfully updated environment for {}", function),
                    ))
                }
                RequestType::Delete => {
                    info!("Delete request for {}, no action taken", function);
                    Ok(ReconcileOutcome::success(
                        physical_id.as_str(),
                        format!("Delete request processed for {}, no action taken.", function),
                    ))
                }
            }
        };

        reconcile_with_timeout("Environment injection", physical_id.clone(), self.timeout, work).await
    }
}
