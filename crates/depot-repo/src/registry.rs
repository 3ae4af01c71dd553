//! Process-wide table of live repositories
//!
//! The table lock is only held to read or mutate the map itself; every
//! collaborator call happens after the guard is dropped.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_CACHE_TTL, DepotConfig, RepositoryKind, RepositorySpec, in_dependency_order};
use crate::context::RequestContext;
use crate::error::{RepoError, Result};
use crate::local::LocalRepository;
use crate::metrics::{Instrumented, RepositoryMetrics};
use crate::remote::RemoteRepository;
use crate::repository::{Collaborators, Repository, is_request_over};
use crate::virtual_repo::VirtualRepository;

/// Engine-wide defaults applied when building repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySettings {
    /// TTL for remote repositories that do not set their own
    pub default_cache_ttl: Duration,
    /// Deduplicate concurrent remote misses
    pub single_flight: bool,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            default_cache_ttl: DEFAULT_CACHE_TTL,
            single_flight: false,
        }
    }
}

impl From<&DepotConfig> for RegistrySettings {
    fn from(config: &DepotConfig) -> Self {
        Self {
            default_cache_ttl: config.default_cache_ttl,
            single_flight: config.single_flight,
        }
    }
}

struct Entry {
    spec: RepositorySpec,
    repository: Arc<dyn Repository>,
    metrics: Arc<RepositoryMetrics>,
}

/// Named repositories built from specs
pub struct RepositoryRegistry {
    collaborators: Collaborators,
    settings: RegistrySettings,
    entries: RwLock<HashMap<String, Entry>>,
}

impl RepositoryRegistry {
    pub fn new(collaborators: Collaborators) -> Self {
        Self::with_settings(collaborators, RegistrySettings::default())
    }

    pub fn with_settings(collaborators: Collaborators, settings: RegistrySettings) -> Self {
        Self {
            collaborators,
            settings,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> RegistrySettings {
        self.settings
    }

    /// Look up a live repository
    pub fn get(&self, name: &str) -> Result<Arc<dyn Repository>> {
        self.entries
            .read()
            .get(name)
            .map(|e| Arc::clone(&e.repository))
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })
    }

    /// The spec a live repository was built from
    pub fn spec(&self, name: &str) -> Result<RepositorySpec> {
        self.entries
            .read()
            .get(name)
            .map(|e| e.spec.clone())
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })
    }

    /// Specs of every live repository, sorted by name
    pub fn specs(&self) -> Vec<RepositorySpec> {
        let mut specs: Vec<_> = self.entries.read().values().map(|e| e.spec.clone()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn metrics(&self, name: &str) -> Result<Arc<RepositoryMetrics>> {
        self.entries
            .read()
            .get(name)
            .map(|e| Arc::clone(&e.metrics))
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Build, register and persist a new repository
    ///
    /// The table entry is removed again if the spec cannot be persisted.
    pub async fn create(
        &self,
        ctx: &RequestContext,
        spec: RepositorySpec,
    ) -> Result<Arc<dyn Repository>> {
        ctx.check()?;
        let repository = self.register(spec.clone())?;

        let saved = ctx
            .run(self.collaborators.persistence.save_repository(&spec))
            .await
            .and_then(|r| r.map_err(|e| RepoError::persistence(&spec.name, "save_repository", e)));
        if let Err(e) = saved {
            self.entries.write().remove(&spec.name);
            warn!(repository = %spec.name, "rolled back registration: {}", e);
            return Err(e);
        }

        info!(
            repository = %spec.name,
            kind = %spec.kind,
            ecosystem = %spec.ecosystem,
            "created repository"
        );
        Ok(repository)
    }

    /// Remove a repository from the table and from persisted configuration
    ///
    /// A local repository that still holds artifacts is only removed with
    /// `force`, which deletes its artifacts first. Virtual repositories that
    /// reference it keep their existing member handle.
    pub async fn delete(&self, ctx: &RequestContext, name: &str, force: bool) -> Result<()> {
        let (repository, kind) = {
            let entries = self.entries.read();
            let entry = entries.get(name).ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })?;
            (Arc::clone(&entry.repository), entry.spec.kind)
        };
        let persistence = &self.collaborators.persistence;

        match kind {
            RepositoryKind::Local => {
                let descriptors = repository.descriptors(ctx).await?;
                if !descriptors.is_empty() && !force {
                    return Err(RepoError::RepositoryNotEmpty {
                        name: name.to_string(),
                        count: descriptors.len(),
                    });
                }
                for descriptor in &descriptors {
                    match repository.delete(ctx, &descriptor.path).await {
                        Ok(()) => {}
                        Err(e) if is_request_over(&e) => return Err(e),
                        Err(e) => warn!(repository = %name, path = %descriptor.path, "forced delete left artifact behind: {}", e),
                    }
                }
            }
            RepositoryKind::Remote => {
                for path in repository.list(ctx, "").await? {
                    repository.invalidate_cache(ctx, &path).await?;
                }
            }
            RepositoryKind::Virtual => {}
        }

        ctx.run(persistence.purge_repository(name))
            .await?
            .map_err(|e| RepoError::persistence(name, "purge_repository", e))?;
        let existed = ctx
            .run(persistence.delete_repository(name))
            .await?
            .map_err(|e| RepoError::persistence(name, "delete_repository", e))?;
        if !existed {
            debug!(repository = %name, "no persisted spec to delete");
        }

        self.entries.write().remove(name);
        info!(repository = %name, "deleted repository");
        Ok(())
    }

    /// Rebuild the table from persisted specs
    ///
    /// Repositories already in the table are left untouched, virtuals whose
    /// members no longer exist are skipped. Returns how many were registered.
    pub async fn restore(&self, ctx: &RequestContext) -> Result<usize> {
        let specs = ctx
            .run(self.collaborators.persistence.list_repositories())
            .await?
            .map_err(|e| RepoError::persistence("*", "list_repositories", e))?;

        let mut restored = 0;
        for spec in in_dependency_order(&specs)? {
            if self.contains(&spec.name) {
                debug!(repository = %spec.name, "already registered");
                continue;
            }
            match self.register(spec.clone()) {
                Ok(_) => restored += 1,
                // A member was deleted after this virtual was persisted
                Err(RepoError::UpstreamNotFound { name }) => {
                    warn!(repository = %spec.name, member = %name, "not restored: member is gone");
                }
                Err(e) => return Err(e),
            }
        }
        info!(restored, "restored repositories");
        Ok(restored)
    }

    /// Create every repository of a configuration file that is not live yet
    pub async fn bootstrap(&self, ctx: &RequestContext, config: &DepotConfig) -> Result<usize> {
        let mut created = 0;
        for spec in config.in_dependency_order()? {
            if self.contains(&spec.name) {
                continue;
            }
            self.create(ctx, spec.clone()).await?;
            created += 1;
        }
        Ok(created)
    }

    fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Validate, build and insert without persisting
    fn register(&self, spec: RepositorySpec) -> Result<Arc<dyn Repository>> {
        spec.validate()?;
        if self.contains(&spec.name) {
            return Err(RepoError::AlreadyExists { name: spec.name });
        }

        let inner = self.build(&spec)?;
        let metrics = Arc::new(RepositoryMetrics::new());
        let repository: Arc<dyn Repository> =
            Arc::new(Instrumented::new(inner, Arc::clone(&metrics)));

        let mut entries = self.entries.write();
        // Another caller may have registered the name while we were building
        if entries.contains_key(&spec.name) {
            return Err(RepoError::AlreadyExists { name: spec.name });
        }
        entries.insert(
            spec.name.clone(),
            Entry {
                spec,
                repository: Arc::clone(&repository),
                metrics,
            },
        );
        Ok(repository)
    }

    fn build(&self, spec: &RepositorySpec) -> Result<Arc<dyn Repository>> {
        let collaborators = &self.collaborators;
        Ok(match spec.kind {
            RepositoryKind::Local => Arc::new(LocalRepository::new(
                &spec.name,
                spec.ecosystem,
                collaborators,
            )),
            RepositoryKind::Remote => {
                let url = spec.url.clone().ok_or_else(|| RepoError::InvalidConfig {
                    message: format!("remote repository {} requires a url", spec.name),
                })?;
                let ttl = spec.cache_ttl.unwrap_or(self.settings.default_cache_ttl);
                Arc::new(
                    RemoteRepository::new(&spec.name, spec.ecosystem, url, ttl, collaborators)
                        .with_single_flight(self.settings.single_flight),
                )
            }
            RepositoryKind::Virtual => {
                let members = spec
                    .upstreams
                    .iter()
                    .map(|name| {
                        self.get(name).map_err(|_| RepoError::UpstreamNotFound {
                            name: name.clone(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Arc::new(VirtualRepository::new(&spec.name, spec.ecosystem, members))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryPersistence, Persistence};
    use crate::store::MemoryContentStore;
    use crate::upstream::HttpUpstream;
    use depot_core::Ecosystem;

    struct Fixture {
        registry: RepositoryRegistry,
        db: MemoryPersistence,
        store: MemoryContentStore,
        collaborators: Collaborators,
    }

    fn fixture() -> Fixture {
        let db = MemoryPersistence::new();
        let store = MemoryContentStore::new();
        let collaborators = Collaborators::new(
            Arc::new(store.clone()),
            Arc::new(db.clone()),
            Arc::new(HttpUpstream::public(Duration::from_secs(1)).unwrap()),
        );
        Fixture {
            registry: RepositoryRegistry::new(collaborators.clone()),
            db,
            store,
            collaborators,
        }
    }

    fn central() -> RepositorySpec {
        RepositorySpec::remote("central", Ecosystem::Maven, "https://repo1.example.com/maven2")
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let f = fixture();
        let ctx = RequestContext::background();

        f.registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Maven))
            .await
            .unwrap();
        f.registry.create(&ctx, central()).await.unwrap();
        let public = f
            .registry
            .create(
                &ctx,
                RepositorySpec::virtual_("public", Ecosystem::Maven, ["libs", "central"]),
            )
            .await
            .unwrap();

        assert_eq!(public.kind(), RepositoryKind::Virtual);
        assert_eq!(f.registry.names(), vec!["central", "libs", "public"]);
        assert_eq!(f.registry.len(), 3);
        assert_eq!(f.registry.get("central").unwrap().kind(), RepositoryKind::Remote);
        assert_eq!(f.db.list_repositories().await.unwrap().len(), 3);

        assert!(matches!(
            f.registry.get("nope").err(),
            Some(RepoError::RepositoryNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_specs() {
        let f = fixture();
        let ctx = RequestContext::background();
        f.registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Npm))
            .await
            .unwrap();

        let dup = f
            .registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Npm))
            .await;
        assert!(matches!(dup.err(), Some(RepoError::AlreadyExists { .. })));

        let mut no_url = central();
        no_url.url = None;
        let err = f.registry.create(&ctx, no_url).await.err();
        assert!(matches!(err, Some(RepoError::InvalidConfig { .. })));

        let dangling = f
            .registry
            .create(
                &ctx,
                RepositorySpec::virtual_("all", Ecosystem::Npm, ["libs", "missing"]),
            )
            .await;
        match dangling.err() {
            Some(RepoError::UpstreamNotFound { name }) => assert_eq!(name, "missing"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.registry.names(), vec!["libs"]);
    }

    #[tokio::test]
    async fn test_create_rolls_back_when_persisting_fails() {
        let f = fixture();
        let ctx = RequestContext::background();
        f.db.fail_operation("save_repository");

        let err = f
            .registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Cargo))
            .await
            .err();
        assert!(matches!(err, Some(RepoError::Persistence { .. })));
        assert!(f.registry.is_empty());
    }

    #[tokio::test]
    async fn test_delete_requires_force_when_not_empty() {
        let f = fixture();
        let ctx = RequestContext::background();
        let libs = f
            .registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Generic))
            .await
            .unwrap();
        libs.push(&ctx, "tool/1.0/tool.bin", b"bin", None)
            .await
            .unwrap();

        match f.registry.delete(&ctx, "libs", false).await.err() {
            Some(RepoError::RepositoryNotEmpty { count, .. }) => assert_eq!(count, 1),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.registry.len(), 1);

        f.registry.delete(&ctx, "libs", true).await.unwrap();
        assert!(f.registry.is_empty());
        assert_eq!(f.store.object_count(), 0);
        assert!(f.db.list_repositories().await.unwrap().is_empty());
        assert_eq!(
            f.db.statistics("libs").await.unwrap(),
            Default::default()
        );

        assert!(matches!(
            f.registry.delete(&ctx, "libs", false).await.err(),
            Some(RepoError::RepositoryNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_does_not_cascade_into_virtuals() {
        let f = fixture();
        let ctx = RequestContext::background();
        f.registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Generic))
            .await
            .unwrap();
        f.registry
            .create(&ctx, RepositorySpec::virtual_("all", Ecosystem::Generic, ["libs"]))
            .await
            .unwrap();

        f.registry.delete(&ctx, "libs", false).await.unwrap();
        assert_eq!(f.registry.names(), vec!["all"]);
    }

    #[tokio::test]
    async fn test_restore_orders_virtuals_after_members() {
        let f = fixture();
        let ctx = RequestContext::background();
        // Persisted out of dependency order
        f.db.save_repository(&RepositorySpec::virtual_("all", Ecosystem::Npm, ["libs", "npmjs"]))
            .await
            .unwrap();
        f.db.save_repository(&RepositorySpec::local("libs", Ecosystem::Npm))
            .await
            .unwrap();
        f.db.save_repository(&RepositorySpec::remote(
            "npmjs",
            Ecosystem::Npm,
            "https://registry.npmjs.org",
        ))
        .await
        .unwrap();

        assert_eq!(f.registry.restore(&ctx).await.unwrap(), 3);
        assert_eq!(f.registry.names(), vec!["all", "libs", "npmjs"]);
        assert_eq!(f.registry.restore(&ctx).await.unwrap(), 0);

        let fresh = RepositoryRegistry::new(f.collaborators.clone());
        assert_eq!(fresh.restore(&ctx).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_restore_skips_virtual_with_deleted_member() {
        let f = fixture();
        let ctx = RequestContext::background();
        f.registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Helm))
            .await
            .unwrap();
        f.registry
            .create(&ctx, RepositorySpec::virtual_("charts", Ecosystem::Helm, ["libs"]))
            .await
            .unwrap();
        f.registry.delete(&ctx, "libs", false).await.unwrap();

        let fresh = RepositoryRegistry::new(f.collaborators.clone());
        assert_eq!(fresh.restore(&ctx).await.unwrap(), 0);
        assert!(fresh.is_empty());
    }

    #[tokio::test]
    async fn test_bootstrap_and_metrics() {
        let f = fixture();
        let ctx = RequestContext::background();
        let mut config = DepotConfig::default();
        config.single_flight = true;
        config.repositories = vec![
            RepositorySpec::virtual_("all", Ecosystem::Generic, ["tools"]),
            RepositorySpec::local("tools", Ecosystem::Generic),
        ];

        let registry =
            RepositoryRegistry::with_settings(f.collaborators.clone(), RegistrySettings::from(&config));
        assert!(registry.settings().single_flight);
        assert_eq!(registry.bootstrap(&ctx, &config).await.unwrap(), 2);
        assert_eq!(registry.bootstrap(&ctx, &config).await.unwrap(), 0);

        let all = registry.get("all").unwrap();
        all.push(&ctx, "tool/1.0/tool.bin", b"bin", None)
            .await
            .unwrap();
        assert_eq!(registry.metrics("all").unwrap().get("push").calls, 1);
        assert_eq!(registry.metrics("tools").unwrap().get("push").calls, 1);
        assert_eq!(registry.spec("tools").unwrap().kind, RepositoryKind::Local);
    }
}
