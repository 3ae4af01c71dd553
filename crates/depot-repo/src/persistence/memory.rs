//! In-memory persistence for testing
//!
//! Stores every record in memory, useful for unit tests without a database.

use async_trait::async_trait;
use depot_core::ArtifactDescriptor;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use super::{CacheEntry, Persistence, PersistenceError, PersistenceResult, RepositoryStatistics};
use crate::config::RepositorySpec;

#[derive(Default)]
struct State {
    /// repository -> descriptors in upload order
    artifacts: HashMap<String, Vec<ArtifactDescriptor>>,
    /// repository -> (pulls, pushes)
    counters: HashMap<String, (u64, u64)>,
    /// repository -> path -> entry
    cache: HashMap<String, BTreeMap<String, CacheEntry>>,
    repositories: Vec<RepositorySpec>,
}

/// In-memory persistence for testing
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    state: Arc<RwLock<State>>,
    /// Track operation counts for assertions
    operations: Arc<RwLock<PersistenceOperationCounts>>,
    failing: Arc<RwLock<HashSet<&'static str>>>,
}

/// Counts of operations performed for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistenceOperationCounts {
    pub artifact_saves: usize,
    pub artifact_deletes: usize,
    pub pulls_recorded: usize,
    pub pushes_recorded: usize,
    pub cache_saves: usize,
    pub cache_deletes: usize,
    pub repository_saves: usize,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `operation` fail (`"save_artifact"`, `"record_pull"`, ...)
    pub fn fail_operation(&self, operation: &'static str) {
        self.failing.write().insert(operation);
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    /// Get operation counts for assertions
    pub fn operation_counts(&self) -> PersistenceOperationCounts {
        self.operations.read().clone()
    }

    /// Reset operation counts
    pub fn reset_counts(&self) {
        *self.operations.write() = PersistenceOperationCounts::default();
    }

    fn guard(&self, operation: &'static str) -> PersistenceResult<()> {
        if self.failing.read().contains(operation) {
            return Err(PersistenceError::Injected(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn save_artifact(&self, descriptor: &ArtifactDescriptor) -> PersistenceResult<()> {
        self.operations.write().artifact_saves += 1;
        self.guard("save_artifact")?;

        let mut state = self.state.write();
        let list = state
            .artifacts
            .entry(descriptor.repository.clone())
            .or_default();
        list.retain(|d| d.path != descriptor.path);
        list.push(descriptor.clone());
        Ok(())
    }

    async fn get_artifact(
        &self,
        repository: &str,
        path: &str,
    ) -> PersistenceResult<Option<ArtifactDescriptor>> {
        self.guard("get_artifact")?;
        let state = self.state.read();
        Ok(state
            .artifacts
            .get(repository)
            .and_then(|list| list.iter().find(|d| d.path == path))
            .cloned())
    }

    async fn list_artifacts(&self, repository: &str) -> PersistenceResult<Vec<ArtifactDescriptor>> {
        self.guard("list_artifacts")?;
        let state = self.state.read();
        Ok(state.artifacts.get(repository).cloned().unwrap_or_default())
    }

    async fn delete_artifact(&self, repository: &str, path: &str) -> PersistenceResult<bool> {
        self.operations.write().artifact_deletes += 1;
        self.guard("delete_artifact")?;

        let mut state = self.state.write();
        let Some(list) = state.artifacts.get_mut(repository) else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|d| d.path != path);
        Ok(list.len() != before)
    }

    async fn set_yanked(
        &self,
        repository: &str,
        path: &str,
        yanked: bool,
    ) -> PersistenceResult<bool> {
        self.guard("set_yanked")?;
        let mut state = self.state.write();
        let found = state
            .artifacts
            .get_mut(repository)
            .and_then(|list| list.iter_mut().find(|d| d.path == path));
        match found {
            Some(descriptor) => {
                descriptor.yanked = yanked;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_pull(&self, repository: &str) -> PersistenceResult<()> {
        self.operations.write().pulls_recorded += 1;
        self.guard("record_pull")?;
        self.state
            .write()
            .counters
            .entry(repository.to_string())
            .or_default()
            .0 += 1;
        Ok(())
    }

    async fn record_push(&self, repository: &str) -> PersistenceResult<()> {
        self.operations.write().pushes_recorded += 1;
        self.guard("record_push")?;
        self.state
            .write()
            .counters
            .entry(repository.to_string())
            .or_default()
            .1 += 1;
        Ok(())
    }

    async fn statistics(&self, repository: &str) -> PersistenceResult<RepositoryStatistics> {
        self.guard("statistics")?;
        let state = self.state.read();
        let (pull_count, push_count) = state.counters.get(repository).copied().unwrap_or_default();
        let artifacts = state.artifacts.get(repository);
        Ok(RepositoryStatistics {
            total_artifacts: artifacts.map(|l| l.len() as u64).unwrap_or(0),
            total_size: artifacts
                .map(|l| l.iter().map(|d| d.size).sum())
                .unwrap_or(0),
            pull_count,
            push_count,
        })
    }

    async fn save_cache_entry(&self, entry: &CacheEntry) -> PersistenceResult<()> {
        self.operations.write().cache_saves += 1;
        self.guard("save_cache_entry")?;
        self.state
            .write()
            .cache
            .entry(entry.repository.clone())
            .or_default()
            .insert(entry.path.clone(), entry.clone());
        Ok(())
    }

    async fn get_cache_entry(
        &self,
        repository: &str,
        path: &str,
    ) -> PersistenceResult<Option<CacheEntry>> {
        self.guard("get_cache_entry")?;
        let state = self.state.read();
        Ok(state
            .cache
            .get(repository)
            .and_then(|entries| entries.get(path))
            .cloned())
    }

    async fn delete_cache_entry(&self, repository: &str, path: &str) -> PersistenceResult<bool> {
        self.operations.write().cache_deletes += 1;
        self.guard("delete_cache_entry")?;
        let mut state = self.state.write();
        Ok(state
            .cache
            .get_mut(repository)
            .and_then(|entries| entries.remove(path))
            .is_some())
    }

    async fn list_cache_entries(&self, repository: &str) -> PersistenceResult<Vec<CacheEntry>> {
        self.guard("list_cache_entries")?;
        let state = self.state.read();
        Ok(state
            .cache
            .get(repository)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_repository(&self, spec: &RepositorySpec) -> PersistenceResult<()> {
        self.operations.write().repository_saves += 1;
        self.guard("save_repository")?;
        let mut state = self.state.write();
        match state.repositories.iter_mut().find(|s| s.name == spec.name) {
            Some(existing) => *existing = spec.clone(),
            None => state.repositories.push(spec.clone()),
        }
        Ok(())
    }

    async fn delete_repository(&self, name: &str) -> PersistenceResult<bool> {
        self.guard("delete_repository")?;
        let mut state = self.state.write();
        let before = state.repositories.len();
        state.repositories.retain(|s| s.name != name);
        Ok(state.repositories.len() != before)
    }

    async fn list_repositories(&self) -> PersistenceResult<Vec<RepositorySpec>> {
        self.guard("list_repositories")?;
        Ok(self.state.read().repositories.clone())
    }

    async fn purge_repository(&self, repository: &str) -> PersistenceResult<()> {
        self.guard("purge_repository")?;
        let mut state = self.state.write();
        state.artifacts.remove(repository);
        state.counters.remove(repository);
        state.cache.remove(repository);
        Ok(())
    }
}
