//! Local repositories
//!
//! A local repository owns its artifacts: bytes live in the content store
//! under `local/<name>/`, descriptors and counters in persistence.

use async_trait::async_trait;
use depot_core::{ArtifactAdapter, ArtifactDescriptor, Ecosystem, adapter_for};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::RepositoryKind;
use crate::context::RequestContext;
use crate::error::{RepoError, Result};
use crate::events::{ArtifactEvent, EventPublisher, EventType, emit};
use crate::persistence::{Persistence, PersistenceResult, RepositoryStatistics};
use crate::repository::{Collaborators, RebuildReport, Repository, is_request_over, wire_path};
use crate::store::{PrefixedStore, StoreResult};

/// Repository that owns its artifacts
pub struct LocalRepository {
    name: String,
    ecosystem: Ecosystem,
    adapter: Box<dyn ArtifactAdapter>,
    store: PrefixedStore,
    persistence: Arc<dyn Persistence>,
    events: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
}

impl LocalRepository {
    pub fn new(name: impl Into<String>, ecosystem: Ecosystem, collaborators: &Collaborators) -> Self {
        let name = name.into();
        Self {
            store: PrefixedStore::local(collaborators.content.clone(), &name),
            adapter: adapter_for(ecosystem),
            name,
            ecosystem,
            persistence: collaborators.persistence.clone(),
            events: collaborators.events.clone(),
            clock: collaborators.clock.clone(),
        }
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

    /// Storage path for a wire path; unparseable paths are looked up as given
    fn canonical(&self, wire: &str) -> String {
        match self.adapter.parse_path(wire) {
            Ok(descriptor) => self.adapter.generate_path(&descriptor),
            Err(_) => wire.to_string(),
        }
    }

    /// Event for a path whose record may already be gone
    fn event(&self, event_type: EventType, path: &str, known: Option<&ArtifactDescriptor>) -> ArtifactEvent {
        let now = self.clock.now();
        match known {
            Some(descriptor) => ArtifactEvent::for_descriptor(event_type, descriptor, now),
            None => {
                let mut descriptor = self
                    .adapter
                    .parse_path(path)
                    .unwrap_or_else(|_| ArtifactDescriptor::new(self.ecosystem, "", "", path));
                descriptor.repository = self.name.clone();
                descriptor.path = path.to_string();
                ArtifactEvent::for_descriptor(event_type, &descriptor, now)
            }
        }
    }

    /// Bring the record of one stored path up to date
    async fn reindex(
        &self,
        ctx: &RequestContext,
        path: &str,
        existing: Option<&ArtifactDescriptor>,
    ) -> Result<()> {
        let parsed = self
            .adapter
            .parse_path(path)
            .map_err(|e| RepoError::from_core(&self.name, path, e))?;
        let size = self.store_op(ctx, "size", path, self.store.size(path)).await?;
        let checksum = self
            .store_op(ctx, "checksum", path, self.store.checksum(path))
            .await?;

        let descriptor = match existing {
            Some(record) if record.size == size && record.checksum.as_deref() == Some(checksum.as_str()) => {
                return Ok(());
            }
            Some(record) => ArtifactDescriptor {
                size,
                checksum: Some(checksum),
                ..record.clone()
            },
            None => {
                let content = self
                    .store_op(ctx, "retrieve", path, self.store.retrieve(path))
                    .await?;
                let mut descriptor = parsed;
                descriptor.metadata.extend(self.adapter.extract_metadata(&content));
                descriptor.repository = self.name.clone();
                descriptor.path = path.to_string();
                descriptor.size = size;
                descriptor.checksum = Some(checksum);
                descriptor.upload_time = Some(self.clock.now());
                descriptor
            }
        };

        self.db_op(ctx, "save_artifact", self.persistence.save_artifact(&descriptor))
            .await
    }
}

#[async_trait]
impl Repository for LocalRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Local
    }

    fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    async fn pull(&self, ctx: &RequestContext, path: &str) -> Result<Vec<u8>> {
        let wire = wire_path(&self.name, path)?;
        let canonical = self.canonical(wire);

        if !self
            .store_op(ctx, "exists", &canonical, self.store.exists(&canonical))
            .await?
        {
            return Err(RepoError::NotFound {
                repository: self.name.clone(),
                path: path.to_string(),
            });
        }
        let content = self
            .store_op(ctx, "retrieve", &canonical, self.store.retrieve(&canonical))
            .await?;

        match self
            .db_op(ctx, "get_artifact", self.persistence.get_artifact(&self.name, &canonical))
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => debug!(repository = %self.name, path = %canonical, "pulled object has no metadata record"),
            Err(e) => warn!(repository = %self.name, path = %canonical, "metadata lookup failed: {}", e),
        }
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
        ctx: &RequestContext,
        path: &str,
        content: &[u8],
        supplied: Option<ArtifactDescriptor>,
    ) -> Result<ArtifactDescriptor> {
        ctx.check()?;
        let wire = wire_path(&self.name, path)?;

        let mut descriptor = self
            .adapter
            .parse_path(wire)
            .map_err(|e| RepoError::from_core(&self.name, path, e))?;
        self.adapter
            .validate_content(content)
            .map_err(|e| RepoError::from_core(&self.name, path, e))?;

        let canonical = self.adapter.generate_path(&descriptor);
        descriptor.metadata.extend(self.adapter.extract_metadata(content));
        if let Some(supplied) = supplied {
            descriptor.metadata.extend(supplied.metadata);
            if !supplied.dependencies.is_empty() {
                descriptor.dependencies = supplied.dependencies;
            }
        }

        self.store_op(ctx, "store", &canonical, self.store.store(&canonical, content))
            .await?;
        let size = self
            .store_op(ctx, "size", &canonical, self.store.size(&canonical))
            .await?;
        let checksum = self
            .store_op(ctx, "checksum", &canonical, self.store.checksum(&canonical))
            .await?;

        descriptor.repository = self.name.clone();
        descriptor.path = canonical;
        descriptor.size = size;
        descriptor.checksum = Some(checksum);
        descriptor.upload_time = Some(self.clock.now());
        descriptor.yanked = false;

        self.db_op(ctx, "save_artifact", self.persistence.save_artifact(&descriptor))
            .await?;
        self.db_op(ctx, "record_push", self.persistence.record_push(&self.name))
            .await?;

        debug!(
            repository = %self.name,
            path = %descriptor.path,
            size = descriptor.size,
            "stored artifact"
        );
        emit(
            self.events.as_ref(),
            ArtifactEvent::for_descriptor(EventType::Add, &descriptor, self.clock.now()),
        );
        Ok(descriptor)
    }

    async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let wire = wire_path(&self.name, path)?;
        let canonical = self.canonical(wire);

        let existing = match self
            .db_op(ctx, "get_artifact", self.persistence.get_artifact(&self.name, &canonical))
            .await
        {
            Ok(record) => record,
            Err(e) if is_request_over(&e) => return Err(e),
            Err(e) => {
                warn!(repository = %self.name, path = %canonical, "metadata lookup failed: {}", e);
                None
            }
        };

        self.store_op(ctx, "delete", &canonical, self.store.delete(&canonical))
            .await?;
        self.db_op(
            ctx,
            "delete_artifact",
            self.persistence.delete_artifact(&self.name, &canonical),
        )
        .await?;

        emit(
            self.events.as_ref(),
            self.event(EventType::Remove, &canonical, existing.as_ref()),
        );
        Ok(())
    }

    async fn list(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>> {
        self.store_op(ctx, "list", prefix, self.store.list(prefix)).await
    }

    async fn get_index(&self, ctx: &RequestContext) -> Result<Vec<u8>> {
        let descriptors = self.descriptors(ctx).await?;
        self.adapter
            .generate_index(&descriptors)
            .map_err(|e| RepoError::from_core(&self.name, "", e))
    }

    async fn invalidate_cache(&self, ctx: &RequestContext, _path: &str) -> Result<()> {
        ctx.check()
    }

    async fn rebuild_index(&self, ctx: &RequestContext) -> Result<RebuildReport> {
        let paths = self.store_op(ctx, "list", "", self.store.list("")).await?;
        let existing: HashMap<String, ArtifactDescriptor> = self
            .db_op(ctx, "list_artifacts", self.persistence.list_artifacts(&self.name))
            .await?
            .into_iter()
            .map(|d| (d.path.clone(), d))
            .collect();

        let mut report = RebuildReport::default();
        for path in &paths {
            report.scanned += 1;
            match self.reindex(ctx, path, existing.get(path)).await {
                Ok(()) => report.indexed += 1,
                Err(e) if is_request_over(&e) => return Err(e),
                Err(e) => {
                    warn!(repository = %self.name, %path, "skipping during rebuild: {}", e);
                    report.skipped += 1;
                }
            }
        }

        info!(
            repository = %self.name,
            scanned = report.scanned,
            indexed = report.indexed,
            skipped = report.skipped,
            "rebuilt index"
        );
        Ok(report)
    }

    async fn get_statistics(&self, ctx: &RequestContext) -> Result<RepositoryStatistics> {
        self.db_op(ctx, "statistics", self.persistence.statistics(&self.name))
            .await
    }

    async fn descriptors(&self, ctx: &RequestContext) -> Result<Vec<ArtifactDescriptor>> {
        self.db_op(ctx, "list_artifacts", self.persistence.list_artifacts(&self.name))
            .await
    }

    async fn set_yanked(
        &self,
        ctx: &RequestContext,
        path: &str,
        yanked: bool,
    ) -> Result<ArtifactDescriptor> {
        let wire = wire_path(&self.name, path)?;
        let canonical = self.canonical(wire);
        let not_found = || RepoError::NotFound {
            repository: self.name.clone(),
            path: path.to_string(),
        };

        if !self
            .db_op(
                ctx,
                "set_yanked",
                self.persistence.set_yanked(&self.name, &canonical, yanked),
            )
            .await?
        {
            return Err(not_found());
        }
        let descriptor = self
            .db_op(ctx, "get_artifact", self.persistence.get_artifact(&self.name, &canonical))
            .await?
            .ok_or_else(not_found)?;

        emit(
            self.events.as_ref(),
            ArtifactEvent::for_descriptor(EventType::Change, &descriptor, self.clock.now()),
        );
        Ok(descriptor)
    }
}
