//! Uranus Store
//!
//! SQLite persistence owned by the agent. One database file holds:
//!
//! - **process**: one row per distinct audited command, with its
//!   occurrence count, the kernel's last judgment, and promotion status
//! - **config**: key → integer settings managed by the administrative
//!   surface and read by the agent
//!
//! Audit rows are never deleted; counts only grow.

pub mod error;
pub mod models;
pub mod repos;

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

pub use error::{StoreError, StoreResult};
pub use models::*;
pub use repos::*;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS process (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        cmd TEXT NOT NULL UNIQUE,
        workdir TEXT NOT NULL,
        binary TEXT NOT NULL,
        argv TEXT NOT NULL,
        count INTEGER NOT NULL,
        judge INTEGER NOT NULL,
        status INTEGER NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS process_cmd_idx ON process (cmd)",
    "CREATE INDEX IF NOT EXISTS process_status_idx ON process (status)",
    r#"
    CREATE TABLE IF NOT EXISTS config (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )
    "#,
];

/// SQLite connection pool shared by the repositories.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database file and its directory.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        info!(path = %path.display(), "Opening store");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Private in-memory database; lives as long as this store.
    pub async fn in_memory() -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Creates tables and indexes. Safe to run on every startup.
    pub async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn audit_repo(&self) -> AuditRepo {
        AuditRepo::new(self.pool.clone())
    }

    pub fn config_repo(&self) -> ConfigRepo {
        ConfigRepo::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let store = Store::in_memory().await.unwrap();
        store.init_schema().await.unwrap();
        store.audit_repo().record_report("/\u{1f}/bin/true", 1).await.unwrap();
        store.init_schema().await.unwrap();

        let records = store.audit_repo().list(10, 0).await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("main.db");
        let store = Store::open(&path).await.unwrap();
        store.init_schema().await.unwrap();
        store.close().await;
        assert!(path.exists());
    }
}
