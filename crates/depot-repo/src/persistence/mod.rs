//! Metadata persistence
//!
//! Everything the engine remembers besides artifact bytes: descriptors, pull
//! and push counters, remote cache entries and repository specs. Two reference
//! backends are provided:
//! - **SQLite**: one database file in WAL mode
//! - **Memory**: maps in memory, with operation counters and failure injection for tests

mod memory;
mod sqlite;

pub use memory::{MemoryPersistence, PersistenceOperationCounts};
pub use sqlite::SqlitePersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::ArtifactDescriptor;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use thiserror::Error;

use crate::config::RepositorySpec;

/// Persistence failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("injected {0} failure")]
    Injected(&'static str),

    #[error("background task failed: {0}")]
    Task(String),
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// A remote repository's record of one cached upstream object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub repository: String,

    /// Wire path the entry was fetched for
    pub path: String,

    /// Path of the cached bytes inside the repository's cache area
    pub local_path: String,

    pub size: u64,

    /// Lowercase hex SHA-256
    pub checksum: String,

    pub upstream_url: String,

    pub fetched_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Whether the entry may still be served without contacting the upstream
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Per-repository counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStatistics {
    pub total_artifacts: u64,
    pub total_size: u64,
    pub pull_count: u64,
    pub push_count: u64,
}

impl Add for RepositoryStatistics {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            total_artifacts: self.total_artifacts + other.total_artifacts,
            total_size: self.total_size + other.total_size,
            pull_count: self.pull_count + other.pull_count,
            push_count: self.push_count + other.push_count,
        }
    }
}

impl AddAssign for RepositoryStatistics {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Metadata store used by every repository
#[async_trait]
pub trait Persistence: Send + Sync {
    // ============ Artifacts ============

    /// Insert or replace the record at `(descriptor.repository, descriptor.path)`
    async fn save_artifact(&self, descriptor: &ArtifactDescriptor) -> PersistenceResult<()>;

    async fn get_artifact(
        &self,
        repository: &str,
        path: &str,
    ) -> PersistenceResult<Option<ArtifactDescriptor>>;

    /// All records of a repository in upload order
    async fn list_artifacts(&self, repository: &str) -> PersistenceResult<Vec<ArtifactDescriptor>>;

    /// Returns whether a record was removed
    async fn delete_artifact(&self, repository: &str, path: &str) -> PersistenceResult<bool>;

    /// Returns whether a record was updated
    async fn set_yanked(&self, repository: &str, path: &str, yanked: bool)
    -> PersistenceResult<bool>;

    // ============ Counters ============

    async fn record_pull(&self, repository: &str) -> PersistenceResult<()>;

    async fn record_push(&self, repository: &str) -> PersistenceResult<()>;

    /// Artifact totals and counters of one repository
    async fn statistics(&self, repository: &str) -> PersistenceResult<RepositoryStatistics>;

    // ============ Cache Entries ============

    /// Insert or replace the entry at `(entry.repository, entry.path)`
    async fn save_cache_entry(&self, entry: &CacheEntry) -> PersistenceResult<()>;

    async fn get_cache_entry(
        &self,
        repository: &str,
        path: &str,
    ) -> PersistenceResult<Option<CacheEntry>>;

    async fn delete_cache_entry(&self, repository: &str, path: &str) -> PersistenceResult<bool>;

    /// Entries of a repository sorted by path
    async fn list_cache_entries(&self, repository: &str) -> PersistenceResult<Vec<CacheEntry>>;

    // ============ Repository Specs ============

    async fn save_repository(&self, spec: &RepositorySpec) -> PersistenceResult<()>;

    async fn delete_repository(&self, name: &str) -> PersistenceResult<bool>;

    /// Specs in creation order
    async fn list_repositories(&self) -> PersistenceResult<Vec<RepositorySpec>>;

    /// Drop every artifact record, counter and cache entry of a repository
    async fn purge_repository(&self, repository: &str) -> PersistenceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_sum() {
        let a = RepositoryStatistics {
            total_artifacts: 2,
            total_size: 100,
            pull_count: 5,
            push_count: 2,
        };
        let mut total = RepositoryStatistics::default();
        total += a;
        total += a;
        assert_eq!(
            total,
            RepositoryStatistics {
                total_artifacts: 4,
                total_size: 200,
                pull_count: 10,
                push_count: 4,
            }
        );
    }

    #[test]
    fn test_cache_entry_freshness() {
        let fetched = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let entry = CacheEntry {
            repository: "r".to_string(),
            path: "p".to_string(),
            local_path: "p".to_string(),
            size: 1,
            checksum: String::new(),
            upstream_url: "https://u/p".to_string(),
            fetched_at: fetched,
            expires_at: fetched + chrono::Duration::hours(1),
        };
        assert!(entry.is_fresh(fetched));
        assert!(entry.is_fresh(fetched + chrono::Duration::minutes(59)));
        assert!(!entry.is_fresh(fetched + chrono::Duration::hours(1)));
    }
}
