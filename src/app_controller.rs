use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::fmt;
use std::sync::Arc;

use crate::app_config::Config;
use crate::bootstrap::env_injector::EnvProperties;
use crate::bootstrap::grant::GrantProperties;
use crate::bootstrap::policy::role_name;
use crate::bootstrap::{
    AccessGuard, EnvInjection, FunctionConfigStore, PermissionGrant, PolicyStore, ReconcileOutcome, RequestType,
    SqliteFunctionConfigStore, SqlitePolicyStore,
};
use crate::database::models::{RunRecord, RunState};
use crate::database::{DatabaseConnection, Repository};
use crate::memory::tmx::{ingest_tmx, IngestReport};
use crate::memory::{SimilarityIndex, SqliteMemoryIndex};
use crate::providers::{self, EmbeddingProvider, GenerationProvider, MailSender};
use crate::storage::{BlobStore, LocalBlobStore};
use crate::workflow::coordinator::LEAF_TASKS;
use crate::workflow::dispatcher::{DISPATCHER_FUNCTION, WORKFLOW_ID_VAR};
use crate::workflow::{
    CombinedDocument, CompletionNotifier, CoordinatorSettings, DispatchReport, DocumentCombiner, DocumentValidator,
    LocalRunStarter, NotifierSettings, ProgressCallback, RunInput, RunStore, SectionTranslator, SqliteRunStore,
    UploadDispatcher, UploadEvent, WorkflowCoordinator,
};

// @module: Application controller wiring the workflow to its collaborators

/// External collaborators the workflow runs against
#[derive(Debug, Clone)]
pub struct Services {
    pub store: Arc<dyn BlobStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub generator: Arc<dyn GenerationProvider>,
    pub mailer: Arc<dyn MailSender>,
    pub index: Arc<dyn SimilarityIndex>,
    pub policies: Arc<dyn PolicyStore>,
    pub functions: Arc<dyn FunctionConfigStore>,
    pub runs: Arc<dyn RunStore>,
}

impl Services {
    /// Local blob store, SQLite-backed state and HTTP model clients
    pub fn from_config(config: &Config) -> Result<Self> {
        let connection = match &config.search.database_path {
            Some(path) => DatabaseConnection::new(path)?,
            None => DatabaseConnection::new_default()?,
        };
        let repository = Repository::new(connection);

        Ok(Self {
            store: Arc::new(LocalBlobStore::new(
                config.storage.root_dir.clone(),
                config.storage.signing_secret.clone(),
            )),
            embedder: providers::embedding_provider(config),
            generator: providers::generation_provider(config),
            mailer: providers::mail_sender(config),
            index: Arc::new(SqliteMemoryIndex::new(
                repository.clone(),
                config.search.collection_name.clone(),
            )),
            policies: Arc::new(SqlitePolicyStore::new(repository.clone())),
            functions: Arc::new(SqliteFunctionConfigStore::new(repository.clone())),
            runs: Arc::new(SqliteRunStore::new(repository)),
        })
    }
}

/// Main application controller
pub struct Controller {
    config: Config,
    services: Services,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller").field("services", &self.services).finish()
    }
}

impl Controller {
    // @method: Create a controller with the collaborators the configuration names
    pub fn with_config(config: Config) -> Result<Self> {
        let services = Services::from_config(&config).context("Failed to initialize services")?;
        Ok(Self { config, services })
    }

    pub fn with_services(config: Config, services: Services) -> Self {
        Self { config, services }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    fn principal(role_id: &str) -> &str {
        role_name(role_id).unwrap_or(role_id)
    }

    /// Assemble a coordinator; the notifier is included only when notifications are on
    pub fn coordinator(&self, progress: Option<ProgressCallback>) -> WorkflowCoordinator {
        let services = &self.services;
        let validator = DocumentValidator::new(services.store.clone(), (&self.config).into());
        let translator = SectionTranslator::new(
            services.embedder.clone(),
            services.index.clone(),
            services.generator.clone(),
            (&self.config).into(),
        );
        let combiner = DocumentCombiner::new(services.store.clone());

        let mut coordinator = WorkflowCoordinator::new(
            validator,
            translator,
            combiner,
            services.runs.clone(),
            CoordinatorSettings::from(&self.config),
        );

        if let Some(settings) = NotifierSettings::from_config(&self.config) {
            coordinator = coordinator.with_notifier(CompletionNotifier::new(
                services.store.clone(),
                services.mailer.clone(),
                settings,
            ));
        }
        if self.config.workflow.enforce_permissions {
            let role = Self::principal(&self.config.workflow.coordinator_role);
            coordinator = coordinator.with_guard(AccessGuard::new(services.policies.clone(), role));
        }
        if let Some(progress) = progress {
            coordinator = coordinator.with_progress(progress);
        }
        coordinator
    }

    fn starter(&self, coordinator: WorkflowCoordinator) -> LocalRunStarter {
        let starter = LocalRunStarter::new(self.config.workflow.workflow_id.clone(), Arc::new(coordinator));
        if self.config.workflow.enforce_permissions {
            let role = Self::principal(&self.config.workflow.dispatcher_role);
            starter.with_caller(AccessGuard::new(self.services.policies.clone(), role))
        } else {
            starter
        }
    }

    /// Translate one stored document in the foreground with a progress bar
    pub async fn translate(&self, bucket: &str, key: &str) -> Result<CombinedDocument> {
        let metadata = self
            .services
            .store
            .head(bucket, key)
            .await
            .with_context(|| format!("Failed to read {}/{}", bucket, key))?;
        let input = RunInput::new(bucket, key, metadata.content_type.unwrap_or_default());

        let progress_bar = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} sections ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%)"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        progress_bar.set_style(style.progress_chars("█▓▒░"));
        progress_bar.set_message(input.document_id.clone());

        let bar = progress_bar.clone();
        let progress: ProgressCallback = Arc::new(move |done, total| {
            bar.set_length(total as u64);
            bar.set_position(done as u64);
        });

        let run_id = uuid::Uuid::new_v4().to_string();
        let result = self.coordinator(Some(progress)).run(&run_id, &input).await;
        progress_bar.finish_and_clear();

        let combined = result.with_context(|| format!("Run {} failed", run_id))?;
        info!(
            "Translated '{}' into {}/{} ({} sections)",
            combined.document_id, combined.bucket, combined.key, combined.section_count
        );
        Ok(combined)
    }

    /// Start a run per uploaded record and wait for all of them
    pub async fn dispatch(&self, event: &UploadEvent) -> Result<DispatchReport> {
        let starter = Arc::new(self.starter(self.coordinator(None)));
        let dispatcher = UploadDispatcher::new(
            self.services.store.clone(),
            starter.clone(),
            self.services.functions.clone(),
        );

        let report = dispatcher.dispatch(event).await;

        for (run_id, outcome) in starter.wait_all().await {
            match outcome {
                Ok(combined) => info!("Run {} wrote {}", run_id, combined.key),
                Err(e) => error!("Run {} failed: {}", run_id, e),
            }
        }
        Ok(report)
    }

    /// Load a TMX file from the store into the translation memory
    pub async fn ingest_tmx(&self, bucket: &str, key: &str) -> Result<IngestReport> {
        let report = ingest_tmx(
            self.services.store.as_ref(),
            bucket,
            key,
            self.services.embedder.as_ref(),
            self.services.index.as_ref(),
            (
                self.config.workflow.default_source_language.as_str(),
                self.config.workflow.default_target_language.as_str(),
            ),
        )
        .await?;
        Ok(report)
    }

    /// Grant (or on Delete revoke) the start-run and invoke-task policies
    pub async fn grant(&self, request: RequestType) -> ReconcileOutcome {
        let workflow = &self.config.workflow;
        let properties = GrantProperties {
            dispatcher_role_id: Some(workflow.dispatcher_role.clone()),
            coordinator_role_id: Some(workflow.coordinator_role.clone()),
            workflow_id: Some(workflow.workflow_id.clone()),
            target_tasks: LEAF_TASKS.iter().map(|task| task.to_string()).collect(),
        };

        PermissionGrant::new(self.services.policies.clone(), workflow.reconcile_timeout())
            .reconcile(request, &properties)
            .await
    }

    /// Write the workflow id into the dispatcher's environment
    pub async fn inject_env(&self, request: RequestType) -> ReconcileOutcome {
        let properties = EnvProperties {
            function_name: DISPATCHER_FUNCTION.to_string(),
            environment: [(WORKFLOW_ID_VAR.to_string(), self.config.workflow.workflow_id.clone())].into(),
        };

        EnvInjection::new(self.services.functions.clone(), self.config.workflow.reconcile_timeout())
            .reconcile(request, &properties)
            .await
    }

    /// Run both bootstrap actions for `request`
    pub async fn bootstrap(&self, request: RequestType) -> Vec<ReconcileOutcome> {
        let outcomes = vec![self.inject_env(request).await, self.grant(request).await];
        for outcome in outcomes.iter().filter(|o| !o.is_success()) {
            warn!("{} failed: {}", outcome.physical_resource_id, outcome.message);
        }
        outcomes
    }

    pub async fn list_runs(&self, state: Option<RunState>, limit: usize) -> Result<Vec<RunRecord>> {
        self.services.runs.list(state, limit).await
    }
}
