/*!
 * Workflow coordinator.
 *
 * Drives one run through `Validate → FanOutTranslate → Combine → [Notify]`.
 * Every stage is a leaf task with its own timeout; the first failure ends
 * the run with that failure recorded, and nothing after it executes.
 *
 * Sections are translated concurrently, bounded by `max_concurrency`.
 * Completion order is arbitrary; the combiner restores document order.
 */

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::combiner::{self, DocumentCombiner};
use super::document::{CombinedDocument, RunInput, TranslatedSection};
use super::notifier::CompletionNotifier;
use super::state::{self, RunStore};
use super::translator::{SectionRequest, SectionTranslator};
use super::validator::{DocumentValidator, ValidatedDocument};
use crate::app_config::Config;
use crate::bootstrap::policy::{AccessGuard, INVOKE_TASK_ACTION};
use crate::database::models::{RunRecord, RunState};
use crate::errors::WorkflowError;

/// Task names, as granted `task:Invoke` on the coordinator role
pub const VALIDATOR_TASK: &str = "document-validator";
pub const TRANSLATOR_TASK: &str = "section-translator";
pub const COMBINER_TASK: &str = "document-combiner";
pub const NOTIFIER_TASK: &str = "completion-notifier";

/// Every task the coordinator invokes
pub const LEAF_TASKS: [&str; 4] = [VALIDATOR_TASK, TRANSLATOR_TASK, COMBINER_TASK, NOTIFIER_TASK];

/// Called with `(translated, total)` after each section completes
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Translator invocations in flight per run
    pub max_concurrency: usize,
    pub leaf_timeout: Duration,
}

impl From<&Config> for CoordinatorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrency: config.workflow.max_concurrency,
            leaf_timeout: config.workflow.leaf_timeout(),
        }
    }
}

/// Await `work`, failing with `LeafTimeout` once `timeout` elapses
pub async fn with_leaf_timeout<T, F>(stage: &str, timeout: Duration, work: F) -> Result<T, WorkflowError>
where
    F: Future<Output = Result<T, WorkflowError>>,
{
    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| WorkflowError::LeafTimeout {
            stage: stage.to_string(),
            timeout_secs: timeout.as_secs(),
        })?
}

pub struct WorkflowCoordinator {
    validator: DocumentValidator,
    translator: SectionTranslator,
    combiner: DocumentCombiner,
    notifier: Option<CompletionNotifier>,
    runs: Arc<dyn RunStore>,
    guard: Option<AccessGuard>,
    progress: Option<ProgressCallback>,
    settings: CoordinatorSettings,
}

impl fmt::Debug for WorkflowCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowCoordinator")
            .field("notifier", &self.notifier.is_some())
            .field("guard", &self.guard.as_ref().map(AccessGuard::role))
            .field("settings", &self.settings)
            .finish()
    }
}

impl WorkflowCoordinator {
    pub fn new(
        validator: DocumentValidator,
        translator: SectionTranslator,
        combiner: DocumentCombiner,
        runs: Arc<dyn RunStore>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            validator,
            translator,
            combiner,
            notifier: None,
            runs,
            guard: None,
            progress: None,
            settings,
        }
    }

    /// Send a completion notice after a successful combine
    pub fn with_notifier(mut self, notifier: CompletionNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Check `task:Invoke` before each leaf
    pub fn with_guard(mut self, guard: AccessGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn runs(&self) -> &Arc<dyn RunStore> {
        &self.runs
    }

    /// Execute one run to completion and record its outcome
    pub async fn run(&self, run_id: &str, input: &RunInput) -> Result<CombinedDocument, WorkflowError> {
        let mut record = RunRecord::new(
            run_id,
            &input.document_id,
            &input.bucket,
            &input.key,
            &input.content_type,
        );
        self.persist(&record).await;
        info!("Run {} started for {}/{}", run_id, input.bucket, input.key);

        let result = self.execute(&mut record, input).await;

        match &result {
            Ok(combined) => info!(
                "Run {} completed: {} sections written to {}",
                run_id, combined.section_count, combined.key
            ),
            Err(e) => {
                error!("Run {} failed in {}: {}", run_id, record.state, e);
                state::fail(&mut record, e);
            }
        }
        self.persist(&record).await;

        result
    }

    async fn execute(&self, record: &mut RunRecord, input: &RunInput) -> Result<CombinedDocument, WorkflowError> {
        self.transition(record, RunState::Validating).await;
        let validated = self.leaf(VALIDATOR_TASK, self.validator.validate(input)).await?;
        record.section_count = validated.sections.len() as i64;

        self.transition(record, RunState::Translating).await;
        let translated = self.fan_out(&validated).await?;
        record.translated_count = translated.len() as i64;
        combiner::ensure_all_sections(validated.sections.iter().map(|s| s.section_id), &translated)?;

        self.transition(record, RunState::Combining).await;
        let combined = self
            .leaf(COMBINER_TASK, self.combiner.combine(&validated.document, translated))
            .await?;
        record.output_key = Some(combined.key.clone());
        record.confidence = Some(combined.confidence).filter(|c| c.is_finite());

        if let Some(notifier) = &self.notifier {
            self.transition(record, RunState::Notifying).await;
            self.leaf(NOTIFIER_TASK, notifier.notify(&combined, validated.recipient.as_deref()))
                .await?;
        }

        self.transition(record, RunState::Completed).await;
        Ok(combined)
    }

    /// Translate every section, at most `max_concurrency` at a time
    ///
    /// Returns on the first failed section; sections still in flight are dropped.
    async fn fan_out(&self, validated: &ValidatedDocument) -> Result<Vec<TranslatedSection>, WorkflowError> {
        let total = validated.sections.len();
        let max_concurrency = self.settings.max_concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(max_concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let document = &validated.document;

        let mut results = stream::iter(validated.sections.clone())
            .map(|section| {
                let semaphore = semaphore.clone();
                let completed = completed.clone();

                async move {
                    let _permit = semaphore
                        .acquire()
                        .await
                        .map_err(|e| WorkflowError::section(section.section_id, WorkflowError::Configuration(e.to_string())))?;

                    let request = SectionRequest {
                        section_id: section.section_id,
                        text: section.text.clone(),
                        source_language: document.source_language.clone(),
                        target_language: document.target_language.clone(),
                        document_id: document.document_id.clone(),
                        bucket: document.bucket.clone(),
                        key: document.key.clone(),
                    };
                    let translation = self
                        .leaf(TRANSLATOR_TASK, self.translator.translate(&request))
                        .await
                        .map_err(|e| WorkflowError::section(section.section_id, e))?;

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(progress) = &self.progress {
                        progress(done, total);
                    }
                    debug!("Section {}/{} translated ({} done)", section.section_id, total, done);

                    Ok::<_, WorkflowError>(TranslatedSection::new(
                        section.section_id,
                        translation.translated_text,
                        translation.confidence,
                    ))
                }
            })
            .buffer_unordered(max_concurrency);

        let mut translated = Vec::with_capacity(total);
        while let Some(result) = results.next().await {
            translated.push(result?);
        }
        Ok(translated)
    }

    async fn leaf<T, F>(&self, task: &str, work: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, WorkflowError>>,
    {
        if let Some(guard) = &self.guard {
            guard.check(INVOKE_TASK_ACTION, task).await?;
        }
        with_leaf_timeout(task, self.settings.leaf_timeout, work).await
    }

    async fn transition(&self, record: &mut RunRecord, next: RunState) {
        match state::advance(record, next) {
            Ok(()) => self.persist(record).await,
            Err(e) => warn!("{:#}", e),
        }
    }

    async fn persist(&self, record: &RunRecord) {
        if let Err(e) = self.runs.save(record).await {
            warn!("Failed to record run {}: {:#}", record.id, e);
        }
    }
}
