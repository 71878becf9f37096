use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::ProjectStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        seq INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_kv_seq ON kv(seq);";

fn db_err(e: impl std::fmt::Display) -> FlowError {
    FlowError::Database(e.to_string())
}

/// SQLite-backed key/value project store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| FlowError::Database(format!("Failed to create db directory: {}", e)))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // WAL mode, relaxed fsync
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite project store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored keys.
    pub fn len(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(db_err)?;
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl ProjectStore for SqliteStore {
    fn put(&self, key: &str, value: serde_json::Value) -> BoxFuture<'_, Result<()>> {
        let key = key.to_string();
        Box::pin(async move {
            let text = serde_json::to_string(&value)?;
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO kv (key, value, seq, updated_at)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM kv), ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    seq = excluded.seq,
                    updated_at = excluded.updated_at",
                params![key, text, Utc::now().to_rfc3339()],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<serde_json::Value>>> {
        let key = key.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let text: Option<String> = conn
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(db_err)?;
            match text {
                Some(t) => Ok(Some(serde_json::from_str(&t)?)),
                None => Ok(None),
            }
        })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool>> {
        let key = key.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let n = conn
                .execute("DELETE FROM kv WHERE key = ?1", params![key])
                .map_err(db_err)?;
            Ok(n > 0)
        })
    }

    fn list(&self, prefix: &str, limit: usize) -> BoxFuture<'_, Result<Vec<String>>> {
        let prefix = prefix.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare(
                    "SELECT key FROM kv
                     WHERE substr(key, 1, length(?1)) = ?1
                     ORDER BY seq DESC
                     LIMIT ?2",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![prefix, limit as i64], |row| row.get::<_, String>(0))
                .map_err(db_err)?;

            let mut keys = Vec::new();
            for row in rows {
                keys.push(row.map_err(db_err)?);
            }
            Ok(keys)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_get_delete() {
        let store = SqliteStore::in_memory().unwrap();
        store.put("runs/a", json!({"status": "completed"})).await.unwrap();
        assert_eq!(
            store.get("runs/a").await.unwrap(),
            Some(json!({"status": "completed"}))
        );
        assert!(store.delete("runs/a").await.unwrap());
        assert!(!store.delete("runs/a").await.unwrap());
        assert_eq!(store.get("runs/a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_newest_first_with_prefix() {
        let store = SqliteStore::in_memory().unwrap();
        store.put("runs/1", json!(1)).await.unwrap();
        store.put("projects/x", json!("p")).await.unwrap();
        store.put("runs/2", json!(2)).await.unwrap();
        store.put("runs/1", json!(11)).await.unwrap();

        assert_eq!(store.list("runs/", 10).await.unwrap(), vec!["runs/1", "runs/2"]);
        assert_eq!(store.list("runs/", 1).await.unwrap(), vec!["runs/1"]);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[tokio::test]
    async fn prefix_is_literal() {
        let store = SqliteStore::in_memory().unwrap();
        store.put("a_b", json!(1)).await.unwrap();
        store.put("axb", json!(2)).await.unwrap();
        assert_eq!(store.list("a_", 10).await.unwrap(), vec!["a_b"]);
    }

    #[tokio::test]
    async fn file_backed_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put("k", json!({"v": true})).await.unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"v": true})));
    }
}
