//! SQLite-backed code cache with TTL expiry and LRU eviction.
//!
//! The cache maps normalized-code SHA-256 ids to previously successful
//! programs. The connection lives behind a mutex and every public operation
//! runs as a single transaction on a blocking worker thread, which gives the
//! ordering guarantee that a `get` following a `store` of the same id always
//! observes the stored row.

use crate::error::Error;
use crate::hashing::hash_code;
use crate::runtime::models::{CacheEntry, CacheSummary};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const CREATE_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS code_cache (
    id TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    code TEXT NOT NULL,
    servers_used TEXT NOT NULL,
    swagger_hash TEXT NOT NULL,
    created_at REAL NOT NULL,
    last_used_at REAL NOT NULL,
    use_count INTEGER DEFAULT 1,
    ttl_seconds INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_cache_last_used ON code_cache(last_used_at);
CREATE INDEX IF NOT EXISTS idx_cache_description ON code_cache(description);
";

/// Durable cache for successfully executed code snippets.
#[derive(Clone)]
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
    ttl_seconds: i64,
    max_entries: usize,
}

impl CacheStore {
    /// Open (or create) the cache database at `db_path` and ensure the
    /// schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] when the file or schema cannot be created.
    pub async fn open(
        db_path: &str,
        ttl_seconds: u64,
        max_entries: usize,
    ) -> Result<Self, Error> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let path = db_path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, Error> {
            let conn = Connection::open(&path)
                .map_err(|e| Error::cache(format!("Failed to open cache database: {e}")))?;
            conn.execute_batch(CREATE_TABLE_SQL)
                .map_err(|e| Error::cache(format!("Failed to initialize cache database: {e}")))?;
            Ok(conn)
        })
        .await
        .map_err(|e| Error::cache(format!("Cache task failed: {e}")))??;

        info!(path = %db_path, "cache initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl_seconds: i64::try_from(ttl_seconds).unwrap_or(i64::MAX),
            max_entries,
        })
    }

    /// In-memory cache for tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] when the schema cannot be created.
    pub fn in_memory(ttl_seconds: u64, max_entries: usize) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::cache(format!("Failed to open in-memory cache: {e}")))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| Error::cache(format!("Failed to initialize cache database: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            ttl_seconds: i64::try_from(ttl_seconds).unwrap_or(i64::MAX),
            max_entries,
        })
    }

    /// Store a successfully executed snippet, upserting on the code id.
    ///
    /// On conflict the entry is revived: `last_used_at` moves to now and
    /// `use_count` increments, while the first insertion's code,
    /// description, `created_at`, and TTL are preserved. Eviction runs after
    /// every store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] on database failure.
    pub async fn store(
        &self,
        code: &str,
        description: &str,
        servers_used: &[String],
        swagger_hash: &str,
    ) -> Result<String, Error> {
        let entry_id = hash_code(code);
        let now = now_secs();
        let ttl_seconds = self.ttl_seconds;
        let max_entries = self.max_entries;

        let conn = Arc::clone(&self.conn);
        let id = entry_id.clone();
        let code = code.to_string();
        let description = description.to_string();
        let servers_json = serde_json::to_string(servers_used)?;
        let swagger_hash = swagger_hash.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), Error> {
            let mut conn = lock(&conn)?;
            let tx = conn.transaction().map_err(cache_err)?;
            tx.execute(
                "INSERT INTO code_cache
                     (id, description, code, servers_used, swagger_hash,
                      created_at, last_used_at, use_count, ttl_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     last_used_at = excluded.last_used_at,
                     use_count = use_count + 1",
                params![
                    id,
                    description,
                    code,
                    servers_json,
                    swagger_hash,
                    now,
                    now,
                    ttl_seconds
                ],
            )
            .map_err(cache_err)?;
            tx.commit().map_err(cache_err)?;

            evict_if_needed(&mut conn, max_entries);
            Ok(())
        })
        .await
        .map_err(|e| Error::cache(format!("Cache task failed: {e}")))??;

        debug!(id = &entry_id[..12], "cache stored");
        Ok(entry_id)
    }

    /// Retrieve an entry by id, enforcing TTL and bumping usage on hit.
    ///
    /// An expired entry is deleted and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] on database failure.
    pub async fn get(&self, entry_id: &str) -> Result<Option<CacheEntry>, Error> {
        let now = now_secs();
        let conn = Arc::clone(&self.conn);
        let id = entry_id.to_string();

        let entry = tokio::task::spawn_blocking(move || -> Result<Option<CacheEntry>, Error> {
            let mut conn = lock(&conn)?;
            let tx = conn.transaction().map_err(cache_err)?;

            let row = tx
                .query_row(
                    "SELECT id, description, code, servers_used, swagger_hash,
                            created_at, last_used_at, use_count, ttl_seconds
                     FROM code_cache WHERE id = ?1",
                    params![id],
                    row_to_entry,
                )
                .optional()
                .map_err(cache_err)?;

            let Some(entry) = row else {
                return Ok(None);
            };

            #[allow(clippy::cast_precision_loss)]
            if now - entry.created_at > entry.ttl_seconds as f64 {
                tx.execute("DELETE FROM code_cache WHERE id = ?1", params![entry.id])
                    .map_err(cache_err)?;
                tx.commit().map_err(cache_err)?;
                return Ok(None);
            }

            tx.execute(
                "UPDATE code_cache
                 SET last_used_at = ?1, use_count = use_count + 1
                 WHERE id = ?2",
                params![now, entry.id],
            )
            .map_err(cache_err)?;
            tx.commit().map_err(cache_err)?;
            Ok(Some(entry))
        })
        .await
        .map_err(|e| Error::cache(format!("Cache task failed: {e}")))??;

        match &entry {
            Some(e) => debug!(id = &e.id[..12], "cache hit"),
            None => debug!(id = %entry_id.get(..12).unwrap_or(entry_id), "cache miss"),
        }
        Ok(entry)
    }

    /// Search non-expired entries by description substring
    /// (case-insensitive), ordered by `use_count DESC, last_used_at DESC`.
    /// The payload excludes the full source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] on database failure.
    pub async fn search(
        &self,
        query: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CacheSummary>, Error> {
        let now = now_secs();
        let conn = Arc::clone(&self.conn);
        let pattern = query.map(|q| format!("%{q}%"));
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        tokio::task::spawn_blocking(move || -> Result<Vec<CacheSummary>, Error> {
            let conn = lock(&conn)?;

            let (sql, use_pattern) = if pattern.is_some() {
                (
                    "SELECT id, description, servers_used, use_count, created_at
                     FROM code_cache
                     WHERE description LIKE ?1 AND (?2 - created_at) < ttl_seconds
                     ORDER BY use_count DESC, last_used_at DESC
                     LIMIT ?3",
                    true,
                )
            } else {
                (
                    "SELECT id, description, servers_used, use_count, created_at
                     FROM code_cache
                     WHERE (?1 - created_at) < ttl_seconds
                     ORDER BY use_count DESC, last_used_at DESC
                     LIMIT ?2",
                    false,
                )
            };

            let mut stmt = conn.prepare(sql).map_err(cache_err)?;
            let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<CacheSummary> {
                let servers_json: String = row.get(2)?;
                Ok(CacheSummary {
                    id: row.get(0)?,
                    description: row.get(1)?,
                    servers_used: serde_json::from_str(&servers_json).unwrap_or_default(),
                    use_count: row.get(3)?,
                    created_at: row.get(4)?,
                })
            };

            let rows = if use_pattern {
                stmt.query_map(params![pattern, now, limit], map_row)
            } else {
                stmt.query_map(params![now, limit], map_row)
            }
            .map_err(cache_err)?;

            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(cache_err)
        })
        .await
        .map_err(|e| Error::cache(format!("Cache task failed: {e}")))?
    }

    /// Delete every entry carrying `swagger_hash`. Returns the number of
    /// rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] on database failure.
    pub async fn invalidate_by_swagger_hash(&self, swagger_hash: &str) -> Result<usize, Error> {
        let conn = Arc::clone(&self.conn);
        let hash = swagger_hash.to_string();

        let count = tokio::task::spawn_blocking(move || -> Result<usize, Error> {
            let conn = lock(&conn)?;
            conn.execute(
                "DELETE FROM code_cache WHERE swagger_hash = ?1",
                params![hash],
            )
            .map_err(cache_err)
        })
        .await
        .map_err(|e| Error::cache(format!("Cache task failed: {e}")))??;

        if count > 0 {
            info!(swagger_hash = &swagger_hash[..12.min(swagger_hash.len())], count, "cache invalidated");
        }
        Ok(count)
    }

    /// Delete every entry past its TTL. Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] on database failure.
    pub async fn cleanup_expired(&self) -> Result<usize, Error> {
        let now = now_secs();
        let conn = Arc::clone(&self.conn);

        let count = tokio::task::spawn_blocking(move || -> Result<usize, Error> {
            let conn = lock(&conn)?;
            conn.execute(
                "DELETE FROM code_cache WHERE (?1 - created_at) >= ttl_seconds",
                params![now],
            )
            .map_err(cache_err)
        })
        .await
        .map_err(|e| Error::cache(format!("Cache task failed: {e}")))??;

        debug!(count, "expired cache entries cleaned");
        Ok(count)
    }
}

/// Evict least-recently-used rows down to `max_entries`. Best-effort: an
/// eviction failure is logged, not raised.
fn evict_if_needed(conn: &mut Connection, max_entries: usize) {
    let result = (|| -> rusqlite::Result<()> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM code_cache", [], |row| row.get(0))?;

        let max = i64::try_from(max_entries).unwrap_or(i64::MAX);
        if count > max {
            let excess = count - max;
            conn.execute(
                "DELETE FROM code_cache WHERE id IN (
                     SELECT id FROM code_cache
                     ORDER BY last_used_at ASC
                     LIMIT ?1
                 )",
                params![excess],
            )?;
            info!(count = excess, "cache evicted LRU entries");
        }
        Ok(())
    })();

    if let Err(e) = result {
        warn!(error = %e, "cache eviction failed");
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    let servers_json: String = row.get(3)?;
    Ok(CacheEntry {
        id: row.get(0)?,
        description: row.get(1)?,
        code: row.get(2)?,
        servers_used: serde_json::from_str(&servers_json).unwrap_or_default(),
        swagger_hash: row.get(4)?,
        created_at: row.get(5)?,
        last_used_at: row.get(6)?,
        use_count: row.get(7)?,
        ttl_seconds: row.get(8)?,
    })
}

fn lock(conn: &Arc<Mutex<Connection>>) -> Result<std::sync::MutexGuard<'_, Connection>, Error> {
    conn.lock()
        .map_err(|e| Error::cache(format!("Cache lock poisoned: {e}")))
}

fn cache_err(e: rusqlite::Error) -> Error {
    Error::cache(e.to_string())
}

#[allow(clippy::cast_precision_loss)]
fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
