/*!
 * Repository layer for database operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 */

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::connection::DatabaseConnection;
use super::models::{
    decode_embedding, encode_embedding, FunctionConfigRecord, MemoryRecord, PolicyRecord,
    RunRecord, RunState,
};

/// Repository for database operations
#[derive(Clone, Debug)]
pub struct Repository {
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Translation memory
    // =========================================================================

    /// Identity of a memory entry within its collection
    pub fn entry_hash(source_text: &str, source_language: &str, target_language: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source_language.as_bytes());
        hasher.update(b"\0");
        hasher.update(target_language.as_bytes());
        hasher.update(b"\0");
        hasher.update(source_text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Insert or replace memory entries in a single transaction
    pub async fn upsert_memory_entries(&self, records: Vec<MemoryRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        self.db
            .transaction_async(move |tx| {
                let mut stmt = tx.prepare(
                    r#"
                    INSERT INTO memory_entries (
                        collection, entry_hash, source_text, translation, source_language,
                        target_language, embedding, origin, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    ON CONFLICT(collection, entry_hash) DO UPDATE SET
                        translation = excluded.translation,
                        embedding = excluded.embedding,
                        origin = excluded.origin
                    "#,
                )?;

                for record in &records {
                    let hash = Self::entry_hash(
                        &record.source_text,
                        &record.source_language,
                        &record.target_language,
                    );
                    stmt.execute(params![
                        record.collection,
                        hash,
                        record.source_text,
                        record.translation,
                        record.source_language,
                        record.target_language,
                        encode_embedding(&record.embedding),
                        record.origin,
                        record.created_at,
                    ])?;
                }

                debug!("Upserted {} memory entries", records.len());
                Ok(records.len())
            })
            .await
    }

    /// Load every entry of a collection
    pub async fn load_memory_entries(&self, collection: &str) -> Result<Vec<MemoryRecord>> {
        let collection = collection.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT id, collection, source_text, translation, source_language,
                           target_language, embedding, origin, created_at
                    FROM memory_entries WHERE collection = ?1
                    ORDER BY id
                    "#,
                )?;

                let rows = stmt.query_map([&collection], |row| {
                    let embedding: Vec<u8> = row.get(6)?;
                    Ok(MemoryRecord {
                        id: Some(row.get(0)?),
                        collection: row.get(1)?,
                        source_text: row.get(2)?,
                        translation: row.get(3)?,
                        source_language: row.get(4)?,
                        target_language: row.get(5)?,
                        embedding: decode_embedding(&embedding),
                        origin: row.get(7)?,
                        created_at: row.get(8)?,
                    })
                })?;

                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await
    }

    pub async fn count_memory_entries(&self, collection: &str) -> Result<i64> {
        let collection = collection.to_string();

        self.db
            .execute_async(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM memory_entries WHERE collection = ?1",
                    [&collection],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await
    }

    // =========================================================================
    // Role policies
    // =========================================================================

    /// Create or replace a named policy on a role
    pub async fn put_role_policy(&self, role_name: &str, policy_name: &str, document: &str) -> Result<()> {
        let role_name = role_name.to_string();
        let policy_name = policy_name.to_string();
        let document = document.to_string();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO role_policies (role_name, policy_name, document, updated_at)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(role_name, policy_name) DO UPDATE SET
                        document = excluded.document,
                        updated_at = excluded.updated_at
                    "#,
                    params![role_name, policy_name, document, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_role_policy(&self, role_name: &str, policy_name: &str) -> Result<Option<PolicyRecord>> {
        let role_name = role_name.to_string();
        let policy_name = policy_name.to_string();

        self.db
            .execute_async(move |conn| {
                let record = conn
                    .query_row(
                        r#"
                        SELECT role_name, policy_name, document, updated_at
                        FROM role_policies WHERE role_name = ?1 AND policy_name = ?2
                        "#,
                        params![role_name, policy_name],
                        Self::parse_policy_row,
                    )
                    .optional()?;
                Ok(record)
            })
            .await
    }

    pub async fn list_role_policies(&self, role_name: &str) -> Result<Vec<PolicyRecord>> {
        let role_name = role_name.to_string();

        self.db
            .execute_async(move |conn| {
                let mut stmt = conn.prepare(
                    r#"
                    SELECT role_name, policy_name, document, updated_at
                    FROM role_policies WHERE role_name = ?1
                    ORDER BY policy_name
                    "#,
                )?;
                let records = stmt
                    .query_map([&role_name], Self::parse_policy_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }

    /// Delete a named policy; returns whether a row was removed
    pub async fn delete_role_policy(&self, role_name: &str, policy_name: &str) -> Result<bool> {
        let role_name = role_name.to_string();
        let policy_name = policy_name.to_string();

        self.db
            .execute_async(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM role_policies WHERE role_name = ?1 AND policy_name = ?2",
                    params![role_name, policy_name],
                )?;
                Ok(deleted > 0)
            })
            .await
    }

    fn parse_policy_row(row: &rusqlite::Row) -> rusqlite::Result<PolicyRecord> {
        Ok(PolicyRecord {
            role_name: row.get(0)?,
            policy_name: row.get(1)?,
            document: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    // =========================================================================
    // Function configuration
    // =========================================================================

    /// Replace a function's environment
    pub async fn put_function_environment(
        &self,
        function_name: &str,
        environment: &BTreeMap<String, String>,
    ) -> Result<()> {
        let function_name = function_name.to_string();
        let environment = serde_json::to_string(environment)?;

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO function_configs (function_name, environment, updated_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT(function_name) DO UPDATE SET
                        environment = excluded.environment,
                        updated_at = excluded.updated_at
                    "#,
                    params![function_name, environment, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_function_config(&self, function_name: &str) -> Result<Option<FunctionConfigRecord>> {
        let function_name = function_name.to_string();

        self.db
            .execute_async(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT function_name, environment, updated_at FROM function_configs WHERE function_name = ?1",
                        [&function_name],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                            ))
                        },
                    )
                    .optional()?;

                match row {
                    Some((function_name, environment, updated_at)) => {
                        let environment = serde_json::from_str(&environment).with_context(|| {
                            format!("Corrupt environment for function {}", function_name)
                        })?;
                        Ok(Some(FunctionConfigRecord {
                            function_name,
                            environment,
                            updated_at,
                        }))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    // =========================================================================
    // Workflow runs
    // =========================================================================

    /// Insert or update a run record
    pub async fn save_run(&self, run: &RunRecord) -> Result<()> {
        let run = run.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO workflow_runs (
                        id, document_id, bucket, object_key, content_type, state,
                        section_count, translated_count, output_key, confidence,
                        failure_kind, failure_reason, started_at, updated_at, finished_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                    ON CONFLICT(id) DO UPDATE SET
                        state = excluded.state,
                        section_count = excluded.section_count,
                        translated_count = excluded.translated_count,
                        output_key = excluded.output_key,
                        confidence = excluded.confidence,
                        failure_kind = excluded.failure_kind,
                        failure_reason = excluded.failure_reason,
                        updated_at = excluded.updated_at,
                        finished_at = excluded.finished_at
                    "#,
                    params![
                        run.id,
                        run.document_id,
                        run.bucket,
                        run.object_key,
                        run.content_type,
                        run.state.to_string(),
                        run.section_count,
                        run.translated_count,
                        run.output_key,
                        run.confidence.filter(|c| c.is_finite()),
                        run.failure_kind,
                        run.failure_reason,
                        run.started_at,
                        run.updated_at,
                        run.finished_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let run_id = run_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_run_sync(conn, &run_id))
            .await
    }

    fn get_run_sync(conn: &Connection, run_id: &str) -> Result<Option<RunRecord>> {
        let result = conn
            .query_row(
                &format!("{} WHERE id = ?1", RUN_COLUMNS),
                [run_id],
                Self::parse_run_row,
            )
            .optional()?;

        Ok(result)
    }

    /// Most recent runs first
    pub async fn list_runs(&self, state: Option<RunState>, limit: usize) -> Result<Vec<RunRecord>> {
        self.db
            .execute_async(move |conn| {
                let records = match state {
                    Some(state) => {
                        let mut stmt = conn.prepare(&format!(
                            "{} WHERE state = ?1 ORDER BY started_at DESC LIMIT ?2",
                            RUN_COLUMNS
                        ))?;
                        let rows = stmt
                            .query_map(params![state.to_string(), limit as i64], Self::parse_run_row)?
                            .collect::<rusqlite::Result<Vec<_>>>()?;
                        rows
                    }
                    None => {
                        let mut stmt = conn.prepare(&format!(
                            "{} ORDER BY started_at DESC LIMIT ?1",
                            RUN_COLUMNS
                        ))?;
                        let rows = stmt
                            .query_map([limit as i64], Self::parse_run_row)?
                            .collect::<rusqlite::Result<Vec<_>>>()?;
                        rows
                    }
                };
                Ok(records)
            })
            .await
    }

    fn parse_run_row(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            document_id: row.get(1)?,
            bucket: row.get(2)?,
            object_key: row.get(3)?,
            content_type: row.get(4)?,
            state: row
                .get::<_, String>(5)?
                .parse()
                .unwrap_or(RunState::Failed),
            section_count: row.get(6)?,
            translated_count: row.get(7)?,
            output_key: row.get(8)?,
            confidence: row.get(9)?,
            failure_kind: row.get(10)?,
            failure_reason: row.get(11)?,
            started_at: row.get(12)?,
            updated_at: row.get(13)?,
            finished_at: row.get(14)?,
        })
    }
}

const RUN_COLUMNS: &str = r#"
    SELECT id, document_id, bucket, object_key, content_type, state,
           section_count, translated_count, output_key, confidence,
           failure_kind, failure_reason, started_at, updated_at, finished_at
    FROM workflow_runs"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_repo() -> Repository {
        Repository::new_in_memory().expect("Failed to create test repository")
    }

    #[tokio::test]
    async fn test_upsertMemoryEntries_shouldStoreAndReload() {
        let repo = create_test_repo();

        let records = vec![
            MemoryRecord::new("tm", "Hello", "Hola", "en", "es", vec![1.0, 0.0]).with_origin("a.tmx"),
            MemoryRecord::new("tm", "Goodbye", "Adiós", "en", "es", vec![0.0, 1.0]),
            MemoryRecord::new("other", "Hello", "Bonjour", "en", "fr", vec![1.0, 1.0]),
        ];
        assert_eq!(repo.upsert_memory_entries(records).await.unwrap(), 3);

        let loaded = repo.load_memory_entries("tm").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].translation, "Hola");
        assert_eq!(loaded[0].embedding, vec![1.0, 0.0]);
        assert_eq!(loaded[0].origin.as_deref(), Some("a.tmx"));
        assert_eq!(repo.count_memory_entries("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsertMemoryEntries_withSameSource_shouldReplaceTranslation() {
        let repo = create_test_repo();

        repo.upsert_memory_entries(vec![MemoryRecord::new("tm", "Hello", "Hola", "en", "es", vec![1.0])])
            .await
            .unwrap();
        repo.upsert_memory_entries(vec![MemoryRecord::new("tm", "Hello", "Buenas", "en", "es", vec![0.5])])
            .await
            .unwrap();

        let loaded = repo.load_memory_entries("tm").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].translation, "Buenas");
        assert_eq!(loaded[0].embedding, vec![0.5]);
    }

    #[tokio::test]
    async fn test_rolePolicy_putTwice_shouldKeepSingleRow() {
        let repo = create_test_repo();

        repo.put_role_policy("dispatcher", "StartPolicy", "{\"v\":1}").await.unwrap();
        repo.put_role_policy("dispatcher", "StartPolicy", "{\"v\":2}").await.unwrap();

        let policies = repo.list_role_policies("dispatcher").await.unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].document, "{\"v\":2}");
    }

    #[tokio::test]
    async fn test_deleteRolePolicy_shouldReportWhetherRemoved() {
        let repo = create_test_repo();
        repo.put_role_policy("role", "p", "{}").await.unwrap();

        assert!(repo.delete_role_policy("role", "p").await.unwrap());
        assert!(!repo.delete_role_policy("role", "p").await.unwrap());
        assert!(repo.get_role_policy("role", "p").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_functionEnvironment_shouldBeReplacedNotMerged() {
        let repo = create_test_repo();

        let mut first = BTreeMap::new();
        first.insert("A".to_string(), "1".to_string());
        first.insert("B".to_string(), "2".to_string());
        repo.put_function_environment("dispatcher", &first).await.unwrap();

        let mut second = BTreeMap::new();
        second.insert("WORKFLOW_ID".to_string(), "wf-1".to_string());
        repo.put_function_environment("dispatcher", &second).await.unwrap();

        let config = repo.get_function_config("dispatcher").await.unwrap().unwrap();
        assert_eq!(config.environment, second);
        assert!(repo.get_function_config("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_saveRun_shouldInsertThenUpdate() {
        let repo = create_test_repo();

        let mut run = RunRecord::new("run-1", "doc123", "docs", "doc123.txt", "text/plain");
        repo.save_run(&run).await.unwrap();

        run.state = RunState::Failed;
        run.failure_kind = Some("GenerationFailure".to_string());
        run.failure_reason = Some("model unavailable".to_string());
        run.confidence = Some(f64::NAN);
        repo.save_run(&run).await.unwrap();

        let loaded = repo.get_run("run-1").await.unwrap().unwrap();
        assert_eq!(loaded.state, RunState::Failed);
        assert_eq!(loaded.failure_kind.as_deref(), Some("GenerationFailure"));
        assert_eq!(loaded.confidence, None);
    }

    #[tokio::test]
    async fn test_listRuns_withStateFilter_shouldReturnMatching() {
        let repo = create_test_repo();

        let mut done = RunRecord::new("run-1", "a", "docs", "a.txt", "text/plain");
        done.state = RunState::Completed;
        repo.save_run(&done).await.unwrap();
        repo.save_run(&RunRecord::new("run-2", "b", "docs", "b.txt", "text/plain"))
            .await
            .unwrap();

        assert_eq!(repo.list_runs(None, 10).await.unwrap().len(), 2);

        let completed = repo.list_runs(Some(RunState::Completed), 10).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, "run-1");
    }
}
