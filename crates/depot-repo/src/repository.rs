//! The repository abstraction shared by local, remote and virtual repositories

use async_trait::async_trait;
use depot_core::{ArtifactDescriptor, Ecosystem, adapter_for};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::config::RepositoryKind;
use crate::context::RequestContext;
use crate::error::{RepoError, Result};
use crate::events::{EventPublisher, NoopPublisher};
use crate::persistence::{Persistence, RepositoryStatistics};
use crate::store::ContentStore;
use crate::upstream::UpstreamClient;

/// Outcome of a rebuild pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    /// Paths found in the content store
    pub scanned: usize,
    /// Paths whose record is now current
    pub indexed: usize,
    /// Paths that could not be indexed
    pub skipped: usize,
}

impl Add for RebuildReport {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            scanned: self.scanned + other.scanned,
            indexed: self.indexed + other.indexed,
            skipped: self.skipped + other.skipped,
        }
    }
}

impl AddAssign for RebuildReport {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// A named artifact repository
///
/// Every operation takes a [`RequestContext`]; collaborator calls give up
/// with `Cancelled` or `DeadlineExceeded` once the request is over.
#[async_trait]
pub trait Repository: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> RepositoryKind;

    fn ecosystem(&self) -> Ecosystem;

    /// Bytes stored at a wire path
    async fn pull(&self, ctx: &RequestContext, path: &str) -> Result<Vec<u8>>;

    /// Store bytes at a wire path
    ///
    /// `supplied` carries caller-known metadata and dependencies; the storage
    /// facts of the returned descriptor always come from the content store.
    async fn push(
        &self,
        ctx: &RequestContext,
        path: &str,
        content: &[u8],
        supplied: Option<ArtifactDescriptor>,
    ) -> Result<ArtifactDescriptor>;

    async fn delete(&self, ctx: &RequestContext, path: &str) -> Result<()>;

    /// Stored paths starting with `prefix`, sorted
    async fn list(&self, ctx: &RequestContext, prefix: &str) -> Result<Vec<String>>;

    /// Protocol index document for this repository's ecosystem
    async fn get_index(&self, ctx: &RequestContext) -> Result<Vec<u8>>;

    /// Forget cached state for a path
    async fn invalidate_cache(&self, ctx: &RequestContext, path: &str) -> Result<()>;

    /// Re-derive metadata records from stored content
    async fn rebuild_index(&self, ctx: &RequestContext) -> Result<RebuildReport>;

    async fn get_statistics(&self, ctx: &RequestContext) -> Result<RepositoryStatistics>;

    /// Every descriptor this repository can account for, in upload order
    async fn descriptors(&self, ctx: &RequestContext) -> Result<Vec<ArtifactDescriptor>>;

    /// Toggle the soft-delete marker of an artifact
    async fn set_yanked(
        &self,
        _ctx: &RequestContext,
        _path: &str,
        _yanked: bool,
    ) -> Result<ArtifactDescriptor> {
        Err(RepoError::UnsupportedOperation {
            repository: self.name().to_string(),
            kind: self.kind(),
            operation: "set_yanked",
        })
    }

    /// Content type of [`Repository::get_index`] output
    fn index_content_type(&self) -> &'static str {
        adapter_for(self.ecosystem()).index_content_type()
    }
}

/// Shared collaborators every repository is built from
#[derive(Clone)]
pub struct Collaborators {
    pub content: Arc<dyn ContentStore>,
    pub persistence: Arc<dyn Persistence>,
    pub events: Arc<dyn EventPublisher>,
    pub upstream: Arc<dyn UpstreamClient>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Collaborators with no event sink and the wall clock
    pub fn new(
        content: Arc<dyn ContentStore>,
        persistence: Arc<dyn Persistence>,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        Self {
            content,
            persistence,
            events: Arc::new(NoopPublisher),
            upstream,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Strip the leading slash and reject paths no repository can hold
pub(crate) fn wire_path<'a>(repository: &str, path: &'a str) -> Result<&'a str> {
    let trimmed = path.trim_start_matches('/');
    let reason = if trimmed.is_empty() {
        Some("empty path")
    } else if trimmed.split('/').any(|seg| seg == "..") {
        Some("path traversal is not allowed")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RepoError::InvalidPath {
            repository: repository.to_string(),
            path: path.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(trimmed),
    }
}

/// Whether an error ends the whole request rather than one member or path
pub(crate) fn is_request_over(error: &RepoError) -> bool {
    matches!(error, RepoError::Cancelled | RepoError::DeadlineExceeded)
}
