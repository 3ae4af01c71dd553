//! Depot Repository Engine
//!
//! This crate turns the stateless adapters of `depot-core` into live
//! repositories:
//!
//! - **Local repositories**: authoritative storage for pushed artifacts
//! - **Remote repositories**: read-through caching proxies with a TTL
//! - **Virtual repositories**: one name over an ordered list of members
//!
//! ## Key Features
//!
//! - **Pluggable collaborators**: content store, persistence, events and
//!   upstream client are traits with file/SQLite/HTTP and in-memory versions
//! - **Request contexts**: every operation honours a deadline and cancellation
//! - **Scoped credentials**: never sent after cross-origin redirects
//! - **Registry**: named repositories built from YAML specs, persisted and
//!   restored across restarts
//!
//! ## Example
//!
//! ```rust,no_run
//! use depot_core::Ecosystem;
//! use depot_repo::{
//!     Collaborators, HttpUpstream, MemoryContentStore, MemoryPersistence, RepositoryRegistry,
//!     RepositorySpec, RequestContext,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let collaborators = Collaborators::new(
//!     Arc::new(MemoryContentStore::new()),
//!     Arc::new(MemoryPersistence::new()),
//!     Arc::new(HttpUpstream::public(Duration::from_secs(30))?),
//! );
//! let registry = RepositoryRegistry::new(collaborators);
//! let ctx = RequestContext::background();
//!
//! registry.create(&ctx, RepositorySpec::local("libs", Ecosystem::Npm)).await?;
//! registry
//!     .create(&ctx, RepositorySpec::remote("npmjs", Ecosystem::Npm, "https://registry.npmjs.org"))
//!     .await?;
//! registry
//!     .create(&ctx, RepositorySpec::virtual_("npm", Ecosystem::Npm, ["libs", "npmjs"]))
//!     .await?;
//!
//! let tarball = registry.get("npm")?.pull(&ctx, "left-pad/-/left-pad-1.3.0.tgz").await?;
//! # let _ = tarball;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod events;
pub mod local;
pub mod metrics;
pub mod persistence;
pub mod registry;
pub mod remote;
pub mod repository;
pub mod store;
pub mod upstream;
pub mod virtual_repo;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DepotConfig, RepositoryKind, RepositorySpec};
pub use context::{CancelHandle, RequestContext};
pub use credentials::{CredentialStore, Credentials, UpstreamAuth};
pub use error::{MemberFailure, RepoError, Result};
pub use events::{ArtifactEvent, ChannelPublisher, EventPublisher, EventType, NoopPublisher};
pub use local::LocalRepository;
pub use metrics::{Instrumented, OperationStats, RepositoryMetrics};
pub use persistence::{
    CacheEntry, MemoryPersistence, Persistence, RepositoryStatistics, SqlitePersistence,
};
pub use registry::{RegistrySettings, RepositoryRegistry};
pub use remote::RemoteRepository;
pub use repository::{Collaborators, RebuildReport, Repository};
pub use store::{ContentStore, FileContentStore, MemoryContentStore, PrefixedStore};
pub use upstream::{HttpUpstream, UpstreamClient, UpstreamError};
pub use virtual_repo::VirtualRepository;
