//! Per-repository operation metrics
//!
//! [`Instrumented`] wraps any repository, times each call inside a tracing
//! span and keeps call/error counts per operation.

use async_trait::async_trait;
use depot_core::{ArtifactDescriptor, Ecosystem};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::config::RepositoryKind;
use crate::context::RequestContext;
use crate::error::Result;
use crate::persistence::RepositoryStatistics;
use crate::repository::{RebuildReport, Repository};

/// Counters for one operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationStats {
    pub calls: u64,
    pub errors: u64,
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
}

/// Operation counters for a single repository
#[derive(Debug, Default)]
pub struct RepositoryMetrics {
    operations: Mutex<BTreeMap<&'static str, OperationStats>>,
}

impl RepositoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, operation: &'static str, elapsed: Duration, failed: bool) {
        let mut operations = self.operations.lock();
        let stats = operations.entry(operation).or_default();
        stats.calls += 1;
        if failed {
            stats.errors += 1;
        }
        stats.total_duration += elapsed;
    }

    /// Copy of the counters, keyed by operation name
    pub fn snapshot(&self) -> BTreeMap<&'static str, OperationStats> {
        self.operations.lock().clone()
    }

    pub fn get(&self, operation: &str) -> OperationStats {
        self.operations
            .lock()
            .get(operation)
            .copied()
            .unwrap_or_default()
    }
}

/// A repository whose calls are traced and counted
pub struct Instrumented {
    inner: Arc<dyn Repository>,
    metrics: Arc<RepositoryMetrics>,
}

impl Instrumented {
    pub fn new(inner: Arc<dyn Repository>, metrics: Arc<RepositoryMetrics>) -> Self {
        Self { inner, metrics }
    }

    pub fn metrics(&self) -> &Arc<RepositoryMetrics> {
        &self.metrics
    }

    async fn observe<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let span = tracing::debug_span!(
            "repository",
            name = self.inner.name(),
            kind = %self.inner.kind(),
            operation
        );
        let started = Instant::now();
        let result = fut.instrument(span).await;
        self.metrics
            .record(operation, started.elapsed(), result.is_err());
        result
    }
}

#[async_trait]
impl Repository for Instrumented {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn kind(&self) -> RepositoryKind {
        self.inner.kind()
    }

    fn ecosystem(&self) -> Ecosystem {
        self.inner.ecosystem()
    }

    async fn pull(&self, ctx: &RequestContext, path: &str) -> Result<Vec<u8>> {
        self.observe("pull", self.inner.pull(ctx, path)).await
    }

    async fn push(
        &self,
        ctx: &RequestContext,
        path: &str,
        content: &[u8],
        supplied: Option<ArtifactDescriptor>,
    ) -> Result<ArtifactDescriptor> {
        self.observe("push", self.inner.push(ctx, path, content, supplied))
            .await
    }

    async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        self.observe("delete", self.inner.delete(ctx, path)).await
    }

    async fn list(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>> {
        self.observe("list", self.inner.list(ctx, prefix)).await
    }

    async fn get_index(&self, ctx: &RequestContext) -> Result<Vec<u8>> {
        self.observe("get_index", self.inner.get_index(ctx)).await
    }

    async fn invalidate_cache(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        self.observe("invalidate_cache", self.inner.invalidate_cache(ctx, path))
            .await
    }

    async fn rebuild_index(&self, ctx: &RequestContext) -> Result<RebuildReport> {
        self.observe("rebuild_index", self.inner.rebuild_index(ctx))
            .await
    }

    async fn get_statistics(&self, ctx: &RequestContext) -> Result<RepositoryStatistics> {
        self.observe("get_statistics", self.inner.get_statistics(ctx))
            .await
    }

    async fn descriptors(&self, ctx: &RequestContext) -> Result<Vec<ArtifactDescriptor>> {
        self.observe("descriptors", self.inner.descriptors(ctx))
            .await
    }

    async fn set_yanked(
        &self,
        ctx: &RequestContext,
        path: &str,
        yanked: bool,
    ) -> Result<ArtifactDescriptor> {
        self.observe("set_yanked", self.inner.set_yanked(ctx, path, yanked))
            .await
    }

    fn index_content_type(&self) -> &'static str {
        self.inner.index_content_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::local::LocalRepository;
    use crate::persistence::MemoryPersistence;
    use crate::repository::Collaborators;
    use crate::store::MemoryContentStore;
    use crate::upstream::HttpUpstream;
    use chrono::DateTime;

    fn instrumented() -> Instrumented {
        let collaborators = Collaborators::new(
            Arc::new(MemoryContentStore::new()),
            Arc::new(MemoryPersistence::new()),
            Arc::new(HttpUpstream::public(Duration::from_secs(1)).unwrap()),
        )
        .with_clock(Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )));
        let local = LocalRepository::new("tools", Ecosystem::Generic, &collaborators);
        Instrumented::new(Arc::new(local), Arc::new(RepositoryMetrics::new()))
    }

    #[tokio::test]
    async fn test_counts_calls_and_errors() {
        let repo = instrumented();
        let ctx = RequestContext::background();

        repo.push(&ctx, "tool/1.0/tool.bin", b"bin", None)
            .await
            .unwrap();
        repo.pull(&ctx, "tool/1.0/tool.bin").await.unwrap();
        repo.pull(&ctx, "tool/2.0/tool.bin").await.unwrap_err();

        let metrics = repo.metrics();
        assert_eq!(metrics.get("push").calls, 1);
        assert_eq!(metrics.get("pull").calls, 2);
        assert_eq!(metrics.get("pull").errors, 1);
        assert_eq!(metrics.get("delete"), OperationStats::default());
        assert_eq!(
            metrics.snapshot().keys().copied().collect::<Vec<_>>(),
            vec!["pull", "push"]
        );
    }

    #[test]
    fn test_identity_is_forwarded() {
        let repo = instrumented();
        assert_eq!(repo.name(), "tools");
        assert_eq!(repo.kind(), RepositoryKind::Local);
        assert_eq!(repo.ecosystem(), Ecosystem::Generic);
    }
}
