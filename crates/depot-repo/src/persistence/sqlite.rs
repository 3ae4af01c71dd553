//! SQLite persistence
//!
//! Features:
//! - WAL mode for better concurrency
//! - Upserts keyed by `(repository, path)`
//! - Blocking calls run on the tokio blocking pool

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::ArtifactDescriptor;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::Path;
use std::sync::Arc;

use super::{CacheEntry, Persistence, PersistenceError, PersistenceResult, RepositoryStatistics};
use crate::config::RepositorySpec;

/// SQLite-backed persistence
#[derive(Clone)]
pub struct SqlitePersistence {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePersistence {
    /// Open or create a database at a specific path
    pub fn open_at(path: &Path) -> PersistenceResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::Task(format!("{}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        Self::init(conn)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> PersistenceResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Initialize database schema
    fn init(conn: Connection) -> PersistenceResult<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!(journal_mode = %mode, "opened metadata database");
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            r#"
            -- Artifact records; id order is upload order
            CREATE TABLE IF NOT EXISTS artifacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repository TEXT NOT NULL,
                path TEXT NOT NULL,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                yanked INTEGER NOT NULL DEFAULT 0,
                descriptor TEXT NOT NULL,
                UNIQUE(repository, path)
            );

            -- Pull and push counters
            CREATE TABLE IF NOT EXISTS counters (
                repository TEXT PRIMARY KEY,
                pulls INTEGER NOT NULL DEFAULT 0,
                pushes INTEGER NOT NULL DEFAULT 0
            );

            -- Remote cache entries
            CREATE TABLE IF NOT EXISTS cache_entries (
                repository TEXT NOT NULL,
                path TEXT NOT NULL,
                local_path TEXT NOT NULL,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                upstream_url TEXT NOT NULL,
                fetched_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (repository, path)
            );

            -- Repository specs in creation order
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT UNIQUE NOT NULL,
                spec TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_repo ON artifacts(repository);
            CREATE INDEX IF NOT EXISTS idx_artifacts_name ON artifacts(repository, name);
            "#,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> PersistenceResult<T>
    where
        F: FnOnce(&mut Connection) -> PersistenceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock();
            f(&mut conn)
        })
        .await
        .map_err(|e| PersistenceError::Task(e.to_string()))?
    }
}

fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn from_micros(v: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(v).unwrap_or_default()
}

fn decode_artifact(json: &str, yanked: bool) -> PersistenceResult<ArtifactDescriptor> {
    let mut descriptor: ArtifactDescriptor = serde_json::from_str(json)?;
    descriptor.yanked = yanked;
    Ok(descriptor)
}

fn cache_entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        repository: row.get(0)?,
        path: row.get(1)?,
        local_path: row.get(2)?,
        size: row.get::<_, i64>(3)?.max(0) as u64,
        checksum: row.get(4)?,
        upstream_url: row.get(5)?,
        fetched_at: from_micros(row.get(6)?),
        expires_at: from_micros(row.get(7)?),
    })
}

const CACHE_COLUMNS: &str =
    "repository, path, local_path, size, checksum, upstream_url, fetched_at, expires_at";

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn save_artifact(&self, descriptor: &ArtifactDescriptor) -> PersistenceResult<()> {
        let json = serde_json::to_string(descriptor)?;
        let d = descriptor.clone();
        self.with_conn(move |conn| {
            // REPLACE drops the old row, so a re-save moves to the end of upload order
            conn.execute(
                r#"
                INSERT OR REPLACE INTO artifacts (repository, path, name, version, size, yanked, descriptor)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![d.repository, d.path, d.name, d.version, d.size as i64, d.yanked, json],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_artifact(
        &self,
        repository: &str,
        path: &str,
    ) -> PersistenceResult<Option<ArtifactDescriptor>> {
        let (repository, path) = (repository.to_string(), path.to_string());
        self.with_conn(move |conn| {
            let row: Option<(String, bool)> = conn
                .query_row(
                    "SELECT descriptor, yanked FROM artifacts WHERE repository = ?1 AND path = ?2",
                    params![repository, path],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            row.map(|(json, yanked)| decode_artifact(&json, yanked))
                .transpose()
        })
        .await
    }

    async fn list_artifacts(&self, repository: &str) -> PersistenceResult<Vec<ArtifactDescriptor>> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT descriptor, yanked FROM artifacts WHERE repository = ?1 ORDER BY id",
            )?;
            let rows = stmt
                .query_map([&repository], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows.iter()
                .map(|(json, yanked)| decode_artifact(json, *yanked))
                .collect()
        })
        .await
    }

    async fn delete_artifact(&self, repository: &str, path: &str) -> PersistenceResult<bool> {
        let (repository, path) = (repository.to_string(), path.to_string());
        self.with_conn(move |conn| {
            let n = conn.execute(
                "DELETE FROM artifacts WHERE repository = ?1 AND path = ?2",
                params![repository, path],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn set_yanked(
        &self,
        repository: &str,
        path: &str,
        yanked: bool,
    ) -> PersistenceResult<bool> {
        let (repository, path) = (repository.to_string(), path.to_string());
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE artifacts SET yanked = ?3 WHERE repository = ?1 AND path = ?2",
                params![repository, path, yanked],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn record_pull(&self, repository: &str) -> PersistenceResult<()> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO counters (repository, pulls, pushes) VALUES (?1, 1, 0)
                ON CONFLICT(repository) DO UPDATE SET pulls = pulls + 1
                "#,
                [&repository],
            )?;
            Ok(())
        })
        .await
    }

    async fn record_push(&self, repository: &str) -> PersistenceResult<()> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO counters (repository, pulls, pushes) VALUES (?1, 0, 1)
                ON CONFLICT(repository) DO UPDATE SET pushes = pushes + 1
                "#,
                [&repository],
            )?;
            Ok(())
        })
        .await
    }

    async fn statistics(&self, repository: &str) -> PersistenceResult<RepositoryStatistics> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            let (count, size): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM artifacts WHERE repository = ?1",
                [&repository],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let (pulls, pushes): (i64, i64) = conn
                .query_row(
                    "SELECT pulls, pushes FROM counters WHERE repository = ?1",
                    [&repository],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .unwrap_or((0, 0));

            Ok(RepositoryStatistics {
                total_artifacts: count.max(0) as u64,
                total_size: size.max(0) as u64,
                pull_count: pulls.max(0) as u64,
                push_count: pushes.max(0) as u64,
            })
        })
        .await
    }

    async fn save_cache_entry(&self, entry: &CacheEntry) -> PersistenceResult<()> {
        let e = entry.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO cache_entries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    CACHE_COLUMNS
                ),
                params![
                    e.repository,
                    e.path,
                    e.local_path,
                    e.size as i64,
                    e.checksum,
                    e.upstream_url,
                    to_micros(e.fetched_at),
                    to_micros(e.expires_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_cache_entry(
        &self,
        repository: &str,
        path: &str,
    ) -> PersistenceResult<Option<CacheEntry>> {
        let (repository, path) = (repository.to_string(), path.to_string());
        self.with_conn(move |conn| {
            let entry = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM cache_entries WHERE repository = ?1 AND path = ?2",
                        CACHE_COLUMNS
                    ),
                    params![repository, path],
                    cache_entry_from_row,
                )
                .optional()?;
            Ok(entry)
        })
        .await
    }

    async fn delete_cache_entry(&self, repository: &str, path: &str) -> PersistenceResult<bool> {
        let (repository, path) = (repository.to_string(), path.to_string());
        self.with_conn(move |conn| {
            let n = conn.execute(
                "DELETE FROM cache_entries WHERE repository = ?1 AND path = ?2",
                params![repository, path],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn list_cache_entries(&self, repository: &str) -> PersistenceResult<Vec<CacheEntry>> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM cache_entries WHERE repository = ?1 ORDER BY path",
                CACHE_COLUMNS
            ))?;
            let entries = stmt
                .query_map([&repository], cache_entry_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
        .await
    }

    async fn save_repository(&self, spec: &RepositorySpec) -> PersistenceResult<()> {
        let json = serde_json::to_string(spec)?;
        let name = spec.name.clone();
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO repositories (name, spec) VALUES (?1, ?2)
                ON CONFLICT(name) DO UPDATE SET spec = excluded.spec
                "#,
                params![name, json],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_repository(&self, name: &str) -> PersistenceResult<bool> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM repositories WHERE name = ?1", [&name])?;
            Ok(n > 0)
        })
        .await
    }

    async fn list_repositories(&self) -> PersistenceResult<Vec<RepositorySpec>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT spec FROM repositories ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows.iter()
                .map(|json| serde_json::from_str(json).map_err(PersistenceError::from))
                .collect()
        })
        .await
    }

    async fn purge_repository(&self, repository: &str) -> PersistenceResult<()> {
        let repository = repository.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM artifacts WHERE repository = ?1", [&repository])?;
            tx.execute("DELETE FROM counters WHERE repository = ?1", [&repository])?;
            tx.execute("DELETE FROM cache_entries WHERE repository = ?1", [&repository])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
