//! SQLite-backed key-value store
//!
//! One `kv` table holds a row per collection key. Every call opens its own
//! connection on the blocking pool so the async callers never stall the
//! runtime.

use super::backend::{KeyValueBackend, VersionedValue};
use crate::error::{AgregError, Result};
use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a connection waits on a lock held by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent backend stored in a single SQLite file
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Create a backend that uses the specified database path.
    ///
    /// The parent directory is created when missing and the schema is
    /// initialized.
    ///
    /// # Examples
    ///
    /// ```
    /// use agregllm::storage::SqliteBackend;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let backend = SqliteBackend::new_with_path(dir.path().join("webapp.db")).unwrap();
    /// assert!(backend.path().exists());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| AgregError::Storage(e.to_string()))?;
        }

        let backend = Self { db_path };
        backend.init()?;
        Ok(backend)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn init(&self) -> Result<()> {
        let conn = open(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create tables")
        .map_err(|e| AgregError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Runs `op` against a fresh connection on the blocking pool
    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = open(&path)?;
            op(&mut conn)
        })
        .await
        .map_err(|e| AgregError::Storage(format!("Storage task failed: {}", e)))?
    }
}

fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .context("Failed to open database")
        .map_err(|e| AgregError::Storage(e.to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| AgregError::Storage(e.to_string()))?;
    Ok(conn)
}

fn storage_err(context: &'static str) -> impl Fn(rusqlite::Error) -> AgregError {
    move |e| AgregError::Storage(format!("{}: {}", context, e))
}

#[async_trait]
impl KeyValueBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<VersionedValue>> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let row = conn
                .query_row(
                    "SELECT value, version FROM kv WHERE key = ?",
                    params![key],
                    |row| {
                        let value: String = row.get(0)?;
                        let version: i64 = row.get(1)?;
                        Ok(VersionedValue {
                            value,
                            version: version as u64,
                        })
                    },
                )
                .optional()
                .map_err(storage_err("Failed to read key"))?;
            Ok(row)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: String,
    ) -> Result<Option<u64>> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let now = Utc::now().to_rfc3339();
            match expected {
                Some(version) => {
                    let changed = conn
                        .execute(
                            "UPDATE kv SET value = ?, version = version + 1, updated_at = ?
                            WHERE key = ? AND version = ?",
                            params![value, now, key, version as i64],
                        )
                        .map_err(storage_err("Failed to update key"))?;
                    Ok((changed == 1).then_some(version + 1))
                }
                None => {
                    let changed = conn
                        .execute(
                            "INSERT OR IGNORE INTO kv (key, value, version, updated_at)
                            VALUES (?, ?, 1, ?)",
                            params![key, value, now],
                        )
                        .map_err(storage_err("Failed to insert key"))?;
                    Ok((changed == 1).then_some(1))
                }
            }
        })
        .await
    }

    async fn put(&self, key: &str, value: String) -> Result<u64> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn
                .transaction()
                .map_err(storage_err("Failed to start transaction"))?;
            tx.execute(
                "INSERT INTO kv (key, value, version, updated_at) VALUES (?1, ?2, 1, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    version = kv.version + 1,
                    updated_at = excluded.updated_at",
                params![key, value, now],
            )
            .map_err(storage_err("Failed to write key"))?;
            let version: i64 = tx
                .query_row("SELECT version FROM kv WHERE key = ?", params![key], |row| {
                    row.get(0)
                })
                .map_err(storage_err("Failed to read version"))?;
            tx.commit()
                .map_err(storage_err("Failed to commit transaction"))?;
            Ok(version as u64)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.with_connection(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?", params![key])
                .map_err(storage_err("Failed to delete key"))?;
            Ok(())
        })
        .await
    }
}
