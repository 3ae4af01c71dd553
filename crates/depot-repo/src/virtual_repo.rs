//! Virtual repositories
//!
//! An ordered list of member repositories behind one name. Member order is
//! precedence for reads; writes go to local members only.

use async_trait::async_trait;
use depot_core::{ArtifactAdapter, ArtifactDescriptor, Ecosystem, adapter_for};
use futures::future::join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::RepositoryKind;
use crate::context::RequestContext;
use crate::error::{MemberFailure, RepoError, Result};
use crate::persistence::RepositoryStatistics;
use crate::repository::{RebuildReport, Repository, is_request_over, wire_path};

/// Ordered aggregation of other repositories
pub struct VirtualRepository {
    name: String,
    ecosystem: Ecosystem,
    adapter: Box<dyn ArtifactAdapter>,
    members: Vec<Arc<dyn Repository>>,
}

impl VirtualRepository {
    /// Members are kept exactly in the given order
    pub fn new(
        name: impl Into<String>,
        ecosystem: Ecosystem,
        members: Vec<Arc<dyn Repository>>,
    ) -> Self {
        Self {
            name: name.into(),
            ecosystem,
            adapter: adapter_for(ecosystem),
            members,
        }
    }

    pub fn members(&self) -> &[Arc<dyn Repository>] {
        &self.members
    }

    fn locals(&self) -> impl Iterator<Item = &Arc<dyn Repository>> {
        self.members
            .iter()
            .filter(|m| m.kind() == RepositoryKind::Local)
    }

    fn aggregate(&self, operation: &'static str, failures: Vec<MemberFailure>) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        Err(RepoError::AggregateFailure {
            repository: self.name.clone(),
            operation,
            failures,
        })
    }

    /// Descriptors of every local member that answered
    async fn local_descriptors(&self, ctx: &RequestContext) -> Result<Vec<ArtifactDescriptor>> {
        let results = join_all(self.locals().map(|m| m.descriptors(ctx))).await;

        let mut descriptors = Vec::new();
        for (member, result) in self.locals().zip(results) {
            match result {
                Ok(found) => descriptors.extend(found),
                Err(e) if is_request_over(&e) => return Err(e),
                Err(e) => warn!(repository = %self.name, member = member.name(), "skipping member: {}", e),
            }
        }
        Ok(descriptors)
    }
}

#[async_trait]
impl Repository for VirtualRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> RepositoryKind {
        RepositoryKind::Virtual
    }

    fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    async fn pull(&self, ctx: &RequestContext, path: &str) -> Result<Vec<u8>> {
        wire_path(&self.name, path)?;

        let mut last = None;
        for member in &self.members {
            match member.pull(ctx, path).await {
                Ok(bytes) => {
                    debug!(repository = %self.name, member = member.name(), %path, "resolved");
                    return Ok(bytes);
                }
                Err(e) if is_request_over(&e) => return Err(e),
                Err(e) => {
                    debug!(repository = %self.name, member = member.name(), "member miss: {}", e);
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) => Err(RepoError::AllUpstreamsFailed {
                repository: self.name.clone(),
                last: Box::new(last),
            }),
            None => Err(RepoError::NotFound {
                repository: self.name.clone(),
                path: path.to_string(),
            }),
        }
    }

    async fn push(
        &self,
        ctx: &RequestContext,
        path: &str,
        content: &[u8],
        supplied: Option<ArtifactDescriptor>,
    ) -> Result<ArtifactDescriptor> {
        let Some(target) = self.locals().next() else {
            return Err(RepoError::NoLocalUpstream {
                repository: self.name.clone(),
            });
        };
        debug!(repository = %self.name, member = target.name(), %path, "routing push");
        target.push(ctx, path, content, supplied).await
    }

    async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let locals: Vec<_> = self.locals().collect();
        if locals.is_empty() {
            return Err(RepoError::NoLocalUpstream {
                repository: self.name.clone(),
            });
        }

        let mut failures = Vec::new();
        for member in locals {
            match member.delete(ctx, path).await {
                Ok(()) => debug!(repository = %self.name, member = member.name(), %path, "deleted from member"),
                Err(e) if is_request_over(&e) => return Err(e),
                Err(error) => failures.push(MemberFailure {
                    member: member.name().to_string(),
                    error,
                }),
            }
        }

        self.aggregate("delete", failures)
    }

    async fn list(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>> {
        let results = join_all(self.members.iter().map(|m| m.list(ctx, prefix))).await;

        let mut union = BTreeSet::new();
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(paths) => union.extend(paths),
                Err(e) if is_request_over(&e) => return Err(e),
                Err(e) => warn!(repository = %self.name, member = member.name(), "skipping member in list: {}", e),
            }
        }
        Ok(union.into_iter().collect())
    }

    async fn get_index(&self, ctx: &RequestContext) -> Result<Vec<u8>> {
        let descriptors = self.local_descriptors(ctx).await?;
        if descriptors.is_empty() {
            return Err(RepoError::NotFound {
                repository: self.name.clone(),
                path: "index".to_string(),
            });
        }
        self.adapter
            .generate_index(&descriptors)
            .map_err(|e| RepoError::from_core(&self.name, "", e))
    }

    async fn invalidate_cache(&self, ctx: &RequestContext, path: &str) -> Result<()> {
        let results = join_all(self.members.iter().map(|m| m.invalidate_cache(ctx, path))).await;

        let mut failures = Vec::new();
        for (member, result) in self.members.iter().zip(results) {
            if let Err(error) = result {
                failures.push(MemberFailure {
                    member: member.name().to_string(),
                    error,
                });
            }
        }
        self.aggregate("invalidate_cache", failures)
    }

    async fn rebuild_index(&self, ctx: &RequestContext) -> Result<RebuildReport> {
        let mut report = RebuildReport::default();
        let mut failures = Vec::new();
        for member in self.locals() {
            match member.rebuild_index(ctx).await {
                Ok(r) => report += r,
                Err(e) if is_request_over(&e) => return Err(e),
                Err(error) => failures.push(MemberFailure {
                    member: member.name().to_string(),
                    error,
                }),
            }
        }
        self.aggregate("rebuild_index", failures)?;
        Ok(report)
    }

    async fn get_statistics(&self, ctx: &RequestContext) -> Result<RepositoryStatistics> {
        let results = join_all(self.members.iter().map(|m| m.get_statistics(ctx))).await;

        let mut total = RepositoryStatistics::default();
        for (member, result) in self.members.iter().zip(results) {
            match result {
                Ok(stats) => total += stats,
                Err(e) if is_request_over(&e) => return Err(e),
                Err(e) => warn!(repository = %self.name, member = member.name(), "member statistics unavailable: {}", e),
            }
        }
        Ok(total)
    }

    async fn descriptors(&self, ctx: &RequestContext) -> Result<Vec<ArtifactDescriptor>> {
        self.local_descriptors(ctx).await
    }
}
