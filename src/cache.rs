use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use tracing::{info, trace};

use crate::errors::{AppError, AppResult};

/// The external call a cached response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    TextSearch,
    Details,
}

impl QueryKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            QueryKind::TextSearch => "textsearch",
            QueryKind::Details => "details",
        }
    }
}

/// `"<kind> <identifier>"`, e.g. `textsearch Blue Bottle Coffee`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(kind: QueryKind, identifier: &str) -> Self {
        Self(format!("{} {}", kind.as_tag(), identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable key to response store. Entries never expire; a second `put` for the
/// same key replaces the first.
#[derive(Clone)]
pub struct QueryCache {
    connection: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl QueryCache {
    pub fn open<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let connection = Connection::open_with_flags(path, flags)?;
        let _mode: String =
            connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        run_migrations(&connection)?;
        info!(
            target: "query_cache",
            path = %path.display(),
            "query cache opened"
        );
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            path: Some(path.to_path_buf()),
        })
    }

    pub fn in_memory() -> AppResult<Self> {
        let connection = Connection::open_in_memory()?;
        run_migrations(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `Ok(None)` is a cache miss; storage failures come back as errors.
    pub fn get(&self, key: &QueryKey) -> AppResult<Option<Value>> {
        let payload: Option<String> = {
            let conn = self.connection.lock();
            conn.query_row(
                "SELECT response FROM query_cache WHERE query_key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?
        };
        match payload {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &QueryKey, response: &Value) -> AppResult<()> {
        let payload = serde_json::to_string(response)?;
        {
            let conn = self.connection.lock();
            conn.execute(
                "INSERT INTO query_cache (query_key, response, cached_at)
                VALUES (?1, ?2, DATETIME('now'))
                ON CONFLICT(query_key) DO UPDATE SET
                    response = excluded.response,
                    cached_at = excluded.cached_at",
                (key.as_str(), payload.as_str()),
            )?;
        }
        trace!(target: "query_cache", key = %key, "response cached");
        Ok(())
    }

    pub fn len(&self) -> AppResult<usize> {
        let conn = self.connection.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> AppResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Closes the store once the last handle is released. Other live clones
    /// keep the connection open and this call becomes a no-op.
    pub fn close(self) -> AppResult<()> {
        match Arc::try_unwrap(self.connection) {
            Ok(mutex) => mutex
                .into_inner()
                .close()
                .map_err(|(_, err)| AppError::Database(err)),
            Err(_) => Ok(()),
        }
    }
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS query_cache (
            query_key TEXT PRIMARY KEY,
            response TEXT NOT NULL,
            cached_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );
        "#,
    )?;
    Ok(())
}
