/*!
 * SQLite connection handle.
 *
 * One connection per process, guarded by a mutex. Async callers reach it
 * through `spawn_blocking` so queries never run on a runtime worker.
 */

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::schema;

const DATA_DIR_NAME: &str = "docflow";
const DATABASE_FILE_NAME: &str = "docflow.db";
const IN_MEMORY_PATH: &str = ":memory:";

/// Shared, schema-initialized SQLite connection
#[derive(Clone)]
pub struct DatabaseConnection {
    path: PathBuf,
    connection: Arc<Mutex<Connection>>,
}

impl fmt::Debug for DatabaseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConnection").field("path", &self.path).finish()
    }
}

impl DatabaseConnection {
    /// Open the database under the user's local data directory
    pub fn new_default() -> Result<Self> {
        Self::new(Self::default_database_path()?)
    }

    /// Open (or create) the database file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {:?}", parent))?;
        }

        info!("Opening database at {:?}", path);
        let connection = Connection::open(&path).with_context(|| format!("Failed to open database: {:?}", path))?;
        Self::from_connection(path, connection)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn new_in_memory() -> Result<Self> {
        debug!("Opening in-memory database");
        let connection = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(PathBuf::from(IN_MEMORY_PATH), connection)
    }

    fn from_connection(path: PathBuf, connection: Connection) -> Result<Self> {
        schema::migrate(&connection)?;
        Ok(Self {
            path,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn default_database_path() -> Result<PathBuf> {
        let base = dirs::data_local_dir()
            .or_else(dirs::data_dir)
            .ok_or_else(|| anyhow!("Could not determine a data directory for the database"))?;
        Ok(base.join(DATA_DIR_NAME).join(DATABASE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with the connection on the current thread
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&self.connection.lock())
    }

    /// Run `f` with the connection on the blocking pool
    pub async fn execute_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || f(&connection.lock()))
            .await
            .context("Database task panicked")?
    }

    /// Run `f` inside a transaction on the blocking pool; an error rolls it back
    pub async fn transaction_async<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock();
            let tx = guard.transaction()?;
            let value = f(&tx)?;
            tx.commit()?;
            Ok(value)
        })
        .await
        .context("Database transaction task panicked")?
    }
}
