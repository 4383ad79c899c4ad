/*!
 * Run bookkeeping: where run records live and how their state may change.
 */

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::database::models::{RunRecord, RunState};
use crate::database::Repository;
use crate::errors::WorkflowError;

/// Persistence for run records
#[async_trait]
pub trait RunStore: Send + Sync + Debug {
    async fn save(&self, run: &RunRecord) -> Result<()>;

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Most recent runs first, optionally restricted to one state
    async fn list(&self, state: Option<RunState>, limit: usize) -> Result<Vec<RunRecord>>;
}

/// Move `run` to `next`, stamping the update (and finish) time
pub fn advance(run: &mut RunRecord, next: RunState) -> Result<()> {
    if !run.state.can_advance_to(next) {
        return Err(anyhow!("Run {} cannot move from {} to {}", run.id, run.state, next));
    }

    let now = chrono::Utc::now().to_rfc3339();
    run.state = next;
    run.updated_at = now.clone();
    if next.is_terminal() {
        run.finished_at = Some(now);
    }
    Ok(())
}

/// Terminate `run` with `error` as the recorded reason
///
/// A run that already finished keeps its terminal state.
pub fn fail(run: &mut RunRecord, error: &WorkflowError) {
    if advance(run, RunState::Failed).is_ok() {
        run.failure_kind = Some(error.kind().to_string());
        run.failure_reason = Some(error.to_string());
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRunStore {
    runs: Arc<RwLock<HashMap<String, RunRecord>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn save(&self, run: &RunRecord) -> Result<()> {
        self.runs.write().insert(run.id.clone(), run.clone());
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.runs.read().get(run_id).cloned())
    }

    async fn list(&self, state: Option<RunState>, limit: usize) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .read()
            .values()
            .filter(|run| state.is_none_or(|s| run.state == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

/// Run records in the `workflow_runs` table
#[derive(Debug, Clone)]
pub struct SqliteRunStore {
    repository: Repository,
}

impl SqliteRunStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn save(&self, run: &RunRecord) -> Result<()> {
        self.repository.save_run(run).await
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>> {
        self.repository.get_run(run_id).await
    }

    async fn list(&self, state: Option<RunState>, limit: usize) -> Result<Vec<RunRecord>> {
        self.repository.list_runs(state, limit).await
    }
}
