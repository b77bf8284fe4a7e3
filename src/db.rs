use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// String-keyed persistent storage, scoped to one backend origin.
///
/// Every handle shares the same connection, so clones are cheap and see each
/// other's writes immediately. Writes are last-write-wins per key.
#[derive(Clone)]
pub struct KvStore {
    conn: Arc<Mutex<Connection>>,
    origin: String,
}

impl KvStore {
    pub fn open(path: &Path, origin: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init(conn, origin)
    }

    pub fn open_in_memory(origin: &str) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, origin)
    }

    fn init(conn: Connection, origin: &str) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_entries (
                origin TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (origin, key)
            )",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            origin: origin.to_string(),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let home_dir = dirs_next::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home_dir.join(".blog_reader").join("cache.db"))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("Failed to lock cache connection"))?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_entries WHERE origin = ?1 AND key = ?2",
                params![self.origin, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("Failed to lock cache connection"))?;
        conn.execute(
            "INSERT OR REPLACE INTO kv_entries (origin, key, value) VALUES (?1, ?2, ?3)",
            params![self.origin, key, value],
        )?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| anyhow!("Failed to lock cache connection"))?;
        let removed = conn.execute(
            "DELETE FROM kv_entries WHERE origin = ?1 AND key = ?2",
            params![self.origin, key],
        )?;
        debug!(key, removed, "cache key removed");
        Ok(())
    }

    /// Removes every key starting with `prefix`. Used for paginated lists.
    pub fn remove_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| anyhow!("Failed to lock cache connection"))?;
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let removed = conn.execute(
            "DELETE FROM kv_entries WHERE origin = ?1 AND key LIKE ?2 ESCAPE '\\'",
            params![self.origin, pattern],
        )?;
        Ok(removed)
    }
}
