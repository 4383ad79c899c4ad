/*!
 * Schema migrations.
 *
 * The applied version lives in `PRAGMA user_version`; each migration runs
 * once, in order, inside its own transaction.
 *
 * Tables:
 * - `memory_entries`: translation memory, embeddings as little-endian f32 blobs
 * - `role_policies`: inline policies written by the permission grant
 * - `function_configs`: per-function environments written by the env injection
 * - `workflow_runs`: one row per coordinator run
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rusqlite::Connection;

const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE memory_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        entry_hash TEXT NOT NULL,
        source_text TEXT NOT NULL,
        translation TEXT NOT NULL,
        source_language TEXT NOT NULL,
        target_language TEXT NOT NULL,
        embedding BLOB NOT NULL,
        origin TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (collection, entry_hash)
    );
    CREATE INDEX idx_memory_collection ON memory_entries (collection);

    CREATE TABLE role_policies (
        role_name TEXT NOT NULL,
        policy_name TEXT NOT NULL,
        document TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (role_name, policy_name)
    );

    CREATE TABLE function_configs (
        function_name TEXT PRIMARY KEY,
        environment TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE workflow_runs (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL,
        bucket TEXT NOT NULL,
        object_key TEXT NOT NULL,
        content_type TEXT NOT NULL,
        state TEXT NOT NULL,
        section_count INTEGER NOT NULL DEFAULT 0,
        translated_count INTEGER NOT NULL DEFAULT 0,
        output_key TEXT,
        confidence REAL,
        failure_kind TEXT,
        failure_reason TEXT,
        started_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        finished_at TEXT
    );
    CREATE INDEX idx_runs_state ON workflow_runs (state);
    CREATE INDEX idx_runs_document ON workflow_runs (document_id);
"#];

/// Highest version this build knows how to reach
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .context("Failed to read schema version")
}

/// Bring the database up to the latest version
pub fn migrate(conn: &Connection) -> Result<()> {
    let current = current_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(anyhow!(
            "Database schema v{} is newer than this build supports (v{})",
            current,
            latest
        ));
    }
    if current == latest {
        debug!("Database schema is at v{}", current);
        return Ok(());
    }

    // In-memory databases refuse WAL and keep their own journal
    let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current as usize) {
        let version = index as u32 + 1;
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("Migration to schema v{} failed", version))?;
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        info!("Migrated database schema to v{}", version);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_migrate_withFreshDatabase_shouldCreateAllTables() {
        let conn = Connection::open_in_memory().unwrap();

        migrate(&conn).unwrap();

        let tables = tables(&conn);
        for table in ["memory_entries", "role_policies", "function_configs", "workflow_runs"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_migrate_calledTwice_shouldBeNoOp() {
        let conn = Connection::open_in_memory().unwrap();

        migrate(&conn).unwrap();
        migrate(&conn).unwrap();

        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_migrate_withNewerVersion_shouldFail() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!("PRAGMA user_version = {};", latest_version() + 1))
            .unwrap();

        assert!(migrate(&conn).is_err());
    }

    #[test]
    fn test_rolePolicies_shouldEnforceOnePolicyPerName() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();

        let insert = "INSERT INTO role_policies (role_name, policy_name, document, updated_at)
                      VALUES ('role', 'policy', '{}', '2024-01-01T00:00:00Z')";
        conn.execute(insert, []).unwrap();

        assert!(conn.execute(insert, []).is_err());
    }
}
