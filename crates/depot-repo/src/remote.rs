//! Remote repositories
//!
//! A read-only caching proxy. Each `(repository, path)` moves through
//! `no entry -> cached -> expired -> cached`: a fresh entry is served from the
//! cache area (`cache/<name>/`), anything else is fetched from
//! `<url>/<path>` and replaces the previous entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depot_core::{ArtifactAdapter, ArtifactDescriptor, Ecosystem, adapter_for};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::RepositoryKind;
use crate::context::RequestContext;
use crate::error::{RepoError, Result};
use crate::persistence::{CacheEntry, Persistence, PersistenceResult, RepositoryStatistics};
use crate::repository::{Collaborators, RebuildReport, Repository, wire_path};
use crate::store::{PrefixedStore, StoreError, StoreResult};
use crate::upstream::{UpstreamClient, join_url};

/// Per-path fetch locks so concurrent misses share one upstream request
#[derive(Default)]
struct SingleFlight {
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SingleFlight {
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inflight
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn join(&self, key: &str) -> Flight<'_> {
        Flight {
            lock: self.lock_for(key),
            key: key.to_string(),
            flights: self,
        }
    }
}

/// Membership in a flight; leaving drops the key once nobody else waits on it
struct Flight<'a> {
    lock: Arc<tokio::sync::Mutex<()>>,
    key: String,
    flights: &'a SingleFlight,
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let mut inflight = self.flights.inflight.lock();
        // One reference in the map, one held here
        if Arc::strong_count(&self.lock) <= 2 {
            inflight.remove(&self.key);
        }
    }
}

/// Read-only caching proxy of an upstream URL
pub struct RemoteRepository {
    name: String,
    ecosystem: Ecosystem,
    adapter: Box<dyn ArtifactAdapter>,
    url: String,
    ttl: Duration,
    cache: PrefixedStore,
    persistence: Arc<dyn Persistence>,
    upstream: Arc<dyn UpstreamClient>,
    clock: Arc<dyn Clock>,
    flights: Option<SingleFlight>,
}

impl RemoteRepository {
    pub fn new(
        name: impl Into<String>,
        ecosystem: Ecosystem,
        url: impl Into<String>,
        ttl: Duration,
        collaborators: &Collaborators,
    ) -> Self {
        let name = name.into();
        Self {
            cache: PrefixedStore::cache(collaborators.content.clone(), &name),
            adapter: adapter_for(ecosystem),
            name,
            ecosystem,
            url: url.into(),
            ttl,
            persistence: collaborators.persistence.clone(),
            upstream: collaborators.upstream.clone(),
            clock: collaborators.clock.clone(),
            flights: None,
        }
    }

    /// Deduplicate concurrent misses for the same path
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = enabled.then(SingleFlight::default);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn store_op<T>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        path: &str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T> {
        ctx.run(fut)
            .await?
            .map_err(|e| RepoError::store(&self.name, operation, path, e))
    }

    async fn db_op<T>(
        &self,
        ctx: &RequestContext,
        operation: &'static str,
        fut: impl Future<Output = PersistenceResult<T>>,
    ) -> Result<T> {
        ctx.run(fut)
            .await?
            .map_err(|e| RepoError::persistence(&self.name, operation, e))
    }

    fn expiry(&self, fetched_at: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| fetched_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Cached bytes when a fresh entry exists and its object is still there
    async fn serve_fresh(&self, ctx: &RequestContext, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(entry) = self
            .db_op(ctx, "get_cache_entry", self.persistence.get_cache_entry(&self.name, path))
            .await?
        else {
            debug!(repository = %self.name, %path, "cache miss");
            return Ok(None);
        };

        if !entry.is_fresh(self.clock.now()) {
            debug!(repository = %self.name, %path, expired_at = %entry.expires_at, "cache entry expired");
            return Ok(None);
        }

        match ctx.run(self.cache.retrieve(&entry.local_path)).await? {
            Ok(bytes) => {
                debug!(repository = %self.name, %path, "cache hit");
                Ok(Some(bytes))
            }
            Err(StoreError::NotFound { .. }) => {
                warn!(repository = %self.name, %path, "cached object missing, refetching");
                Ok(None)
            }
            Err(e) => Err(RepoError::store(&self.name, "retrieve", &entry.local_path, e)),
        }
    }

    async fn fetch_and_cache(&self, ctx: &RequestContext, path: &str) -> Result<Vec<u8>> {
        let url = join_url(&self.url, path);
        debug!(repository = %self.name, %url, "fetching from upstream");

        let bytes = ctx
            .run(self.upstream.fetch(&url))
            .await?
            .map_err(|e| RepoError::UpstreamFetchFailed {
                repository: self.name.clone(),
                url: url.clone(),
                status: e.status(),
                reason: e.to_string(),
            })?;
        let fetched_at = self.clock.now();

        self.store_op(ctx, "store", path, self.cache.store(path, &bytes))
            .await?;
        let size = self.store_op(ctx, "size", path, self.cache.size(path)).await?;
        let checksum = self
            .store_op(ctx, "checksum", path, self.cache.checksum(path))
            .await?;

        let entry = CacheEntry {
            repository: self.name.clone(),
            path: path.to_string(),
            local_path: path.to_string(),
            size,
            checksum,
            upstream_url: url,
            fetched_at,
            expires_at: self.expiry(fetched_at),
        };
        self.db_op(ctx, "save_cache_entry", self.persistence.save_cache_entry(&entry))
            .await?;

        self.store_op(ctx, "retrieve", path, self.cache.retrieve(path))
            .await
    }

    async fn fetch_once(&self, ctx: &RequestContext, path: &str) -> Result<Vec<u8>> {
        let Some(flights) = &self.flights else {
            return self.fetch_and_cache(ctx, path).await;
        };

        let flight = flights.join(path);
        let _leader = ctx.run(flight.lock.lock()).await?;
        // Another request may have filled the cache while we waited
        if let Some(bytes) = self.serve_fresh(ctx, path).await? {
            return Ok(bytes);
        }
        self.fetch_and_cache(ctx, path).await
    }

    fn describe(&self, entry: &CacheEntry) -> Option<ArtifactDescriptor> {
        let mut descriptor = self.adapter.parse_path(&entry.path).ok()?;
        descriptor.repository = self.name.clone();
        descriptor.path = entry.path.clone();
        descriptor.size = entry.size;
        descriptor.checksum = Some(entry.checksum.clone());
        descriptor.upload_time = Some(entry.fetched_at);
        Some(descriptor)
    }

    fn unsupported(&self, operation: &'static str) -> RepoError {
        RepoError::UnsupportedOperation {
            repository: self.name.clone(),
            kind: RepositoryKind::Remote,
            operation,
        }
    }
}

#[async_trait]
impl Repository for RemoteRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Remote
    }

    fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    async fn pull(&self, ctx: &RequestContext, path: &str) -> Result<Vec<u8>> {
        let wire = wire_path(&self.name, path)?;

        let content = match self.serve_fresh(ctx, wire).await? {
            Some(bytes) => bytes,
            None => self.fetch_once(ctx, wire).await?,
        };

        if let Err(e) = self
            .db_op(ctx, "record_pull", self.persistence.record_pull(&self.name))
            .await
        {
            warn!(repository = %self.name, "failed to record pull: {}", e);
        }
        Ok(content)
    }

    async fn push(
        &self,
        _ctx: &RequestContext,
        _path: &str,
        _content: &[u8],
        _supplied: Option<ArtifactDescriptor>,
    ) -> Result<ArtifactDescriptor> {
        Err(self.unsupported("push"))
    }

    async fn delete(&self, _ctx: &RequestContext, _path: &str) -> Result<()> {
        Err(self.unsupported("delete"))
    }

    async fn list(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_start_matches('/');
        let entries = self
            .db_op(ctx, "list_cache_entries", self.persistence.list_cache_entries(&self.name))
            .await?;
        Ok(entries
            .into_iter()
            .map(|e| e.path)
            .filter(|p| p.starts_with(prefix))
            .collect())
    }

    async fn get_index(&self, ctx: &RequestContext) -> Result<Vec<u8>> {
        let descriptors = self.descriptors(ctx).await?;
        self.adapter
            .generate_index(&descriptors)
            .map_err(|e| RepoError::from_core(&self.name, "", e))
    }

    async fn invalidate_cache(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let wire = wire_path(&self.name, path)?;
        let Some(entry) = self
            .db_op(ctx, "get_cache_entry", self.persistence.get_cache_entry(&self.name, wire))
            .await?
        else {
            return Ok(());
        };

        match ctx.run(self.cache.delete(&entry.local_path)).await? {
            Ok(()) | Err(StoreError::NotFound { .. }) => {}
            Err(e) => return Err(RepoError::store(&self.name, "delete", &entry.local_path, e)),
        }
        self.db_op(
            ctx,
            "delete_cache_entry",
            self.persistence.delete_cache_entry(&self.name, wire),
        )
        .await?;
        debug!(repository = %self.name, path = %wire, "invalidated cache entry");
        Ok(())
    }

    async fn rebuild_index(&self, ctx: &RequestContext) -> Result<RebuildReport> {
        ctx.check()?;
        Ok(RebuildReport::default())
    }

    async fn get_statistics(&self, ctx: &RequestContext) -> Result<RepositoryStatistics> {
        let entries = self
            .db_op(ctx, "list_cache_entries", self.persistence.list_cache_entries(&self.name))
            .await?;
        let counters = self
            .db_op(ctx, "statistics", self.persistence.statistics(&self.name))
            .await?;
        Ok(RepositoryStatistics {
            total_artifacts: entries.len() as u64,
            total_size: entries.iter().map(|e| e.size).sum(),
            pull_count: counters.pull_count,
            push_count: 0,
        })
    }

    async fn descriptors(&self, ctx: &RequestContext) -> Result<Vec<ArtifactDescriptor>> {
        let mut entries = self
            .db_op(ctx, "list_cache_entries", self.persistence.list_cache_entries(&self.name))
            .await?;
        entries.sort_by(|a, b| a.fetched_at.cmp(&b.fetched_at).then_with(|| a.path.cmp(&b.path)));
        Ok(entries.iter().filter_map(|e| self.describe(e)).collect())
    }
}
