//! Wiring of the reference collaborators behind the CLI

use depot_repo::{
    Collaborators, CredentialStore, DepotConfig, FileContentStore, HttpUpstream, RegistrySettings,
    Repository, RepositoryRegistry, RequestContext, SqlitePersistence,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{CliError, Result};

/// Location of the configuration and credential files
#[derive(Debug, Clone)]
pub struct Paths {
    pub config: PathBuf,
    pub credentials: PathBuf,
}

impl Paths {
    /// An explicit config file keeps its credentials next to it
    pub fn resolve(config: Option<&Path>) -> Result<Self> {
        match config {
            Some(config) => Ok(Self {
                config: config.to_path_buf(),
                credentials: config
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join("credentials.yaml"),
            }),
            None => Ok(Self {
                config: DepotConfig::default_path()?,
                credentials: CredentialStore::default_path()?,
            }),
        }
    }

    pub fn load_config(&self) -> Result<DepotConfig> {
        if self.config.exists() {
            Ok(DepotConfig::load_from(&self.config)?)
        } else {
            Ok(DepotConfig::default())
        }
    }

    pub fn load_credentials(&self) -> Result<CredentialStore> {
        if self.credentials.exists() {
            Ok(CredentialStore::load_from(&self.credentials)?)
        } else {
            Ok(CredentialStore::default())
        }
    }
}

/// A live registry over the on-disk store and database
pub struct Engine {
    pub registry: RepositoryRegistry,
    pub ctx: RequestContext,
}

impl Engine {
    /// Open the store and database, restore persisted repositories and
    /// create any configured ones that are missing
    pub async fn open(config: &DepotConfig, credentials: &CredentialStore) -> Result<Self> {
        let content = FileContentStore::new(config.storage_root()?)
            .map_err(|e| CliError::internal(format!("cannot open content store: {}", e)))?;

        let persistence = SqlitePersistence::open_at(&config.database_path()?)
            .map_err(|e| CliError::internal(format!("cannot open database: {}", e)))?;

        let scoped = credentials.scoped_for(&config.repositories)?;
        let upstream = HttpUpstream::new(scoped, config.upstream_timeout)
            .map_err(|e| CliError::internal(format!("cannot build HTTP client: {}", e)))?;

        let collaborators = Collaborators::new(
            Arc::new(content),
            Arc::new(persistence),
            Arc::new(upstream),
        );
        let registry =
            RepositoryRegistry::with_settings(collaborators, RegistrySettings::from(config));

        let ctx = RequestContext::background();
        let restored = registry.restore(&ctx).await?;
        let created = registry.bootstrap(&ctx, config).await?;
        tracing::debug!(restored, created, "engine ready");

        Ok(Self { registry, ctx })
    }

    pub fn repository(&self, name: &str) -> Result<Arc<dyn Repository>> {
        Ok(self.registry.get(name)?)
    }
}
