//! Repository configuration management
//!
//! Stores the engine configuration in `~/.config/depot/depot.yaml`

use depot_core::Ecosystem;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RepoError, Result};

/// Default lifetime of a remote cache entry
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default timeout for one upstream fetch
pub const DEFAULT_UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Engine configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepotConfig {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Content store root (defaults to the user data directory)
    #[serde(default)]
    pub storage_root: Option<PathBuf>,

    /// SQLite database file (defaults to the user data directory)
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// TTL for remote repositories that do not set their own
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub default_cache_ttl: Duration,

    #[serde(default = "default_upstream_timeout", with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// Deduplicate concurrent cache misses for the same path
    #[serde(default)]
    pub single_flight: bool,

    /// Configured repositories
    #[serde(default)]
    pub repositories: Vec<RepositorySpec>,
}

fn default_api_version() -> String {
    "depot.io/v1".to_string()
}

fn default_cache_ttl() -> Duration {
    DEFAULT_CACHE_TTL
}

fn default_upstream_timeout() -> Duration {
    DEFAULT_UPSTREAM_TIMEOUT
}

impl Default for DepotConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            storage_root: None,
            database: None,
            default_cache_ttl: DEFAULT_CACHE_TTL,
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
            single_flight: false,
            repositories: Vec::new(),
        }
    }
}

impl DepotConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        for spec in &config.repositories {
            spec.validate()?;
        }
        Ok(config)
    }

    /// Save configuration to default location
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("depot").join("depot.yaml"))
    }

    fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine data directory".to_string(),
        })?;
        Ok(data_dir.join("depot"))
    }

    /// Configured or default content store root
    pub fn storage_root(&self) -> Result<PathBuf> {
        match &self.storage_root {
            Some(root) => Ok(root.clone()),
            None => Ok(Self::data_dir()?.join("objects")),
        }
    }

    /// Configured or default database file
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(db) => Ok(db.clone()),
            None => Ok(Self::data_dir()?.join("depot.db")),
        }
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&RepositorySpec> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Add a repository
    pub fn add(&mut self, spec: RepositorySpec) -> Result<()> {
        spec.validate()?;
        if self.get(&spec.name).is_some() {
            return Err(RepoError::AlreadyExists {
                name: spec.name.clone(),
            });
        }
        self.repositories.push(spec);
        Ok(())
    }

    /// Remove a repository by name
    pub fn remove(&mut self, name: &str) -> Result<RepositorySpec> {
        let idx = self
            .repositories
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        Ok(self.repositories.remove(idx))
    }

    /// List all repository names
    pub fn names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name.as_str()).collect()
    }

    /// Repositories ordered so that every virtual comes after its members
    ///
    /// Members not declared in this file are assumed to exist already.
    pub fn in_dependency_order(&self) -> Result<Vec<&RepositorySpec>> {
        in_dependency_order(&self.repositories)
    }
}

/// Order specs so every upstream precedes the virtual that references it
pub fn in_dependency_order(specs: &[RepositorySpec]) -> Result<Vec<&RepositorySpec>> {
    let by_name: HashMap<&str, &RepositorySpec> =
        specs.iter().map(|s| (s.name.as_str(), s)).collect();

    let mut ordered = Vec::with_capacity(specs.len());
    let mut done: HashSet<&str> = HashSet::new();
    let mut visiting: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        spec: &'a RepositorySpec,
        by_name: &HashMap<&str, &'a RepositorySpec>,
        done: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        ordered: &mut Vec<&'a RepositorySpec>,
    ) -> Result<()> {
        if done.contains(spec.name.as_str()) {
            return Ok(());
        }
        if !visiting.insert(spec.name.as_str()) {
            return Err(RepoError::InvalidConfig {
                message: format!("repository {} is part of a virtual cycle", spec.name),
            });
        }
        for upstream in &spec.upstreams {
            if let Some(member) = by_name.get(upstream.as_str()) {
                visit(member, by_name, done, visiting, ordered)?;
            }
        }
        visiting.remove(spec.name.as_str());
        done.insert(spec.name.as_str());
        ordered.push(spec);
        Ok(())
    }

    for spec in specs {
        visit(spec, &by_name, &mut done, &mut visiting, &mut ordered)?;
    }
    Ok(ordered)
}

/// Repository kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    /// Owns its artifacts
    Local,

    /// Read-only caching proxy of an upstream URL
    Remote,

    /// Ordered aggregation of other repositories
    Virtual,
}

impl RepositoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryKind::Local => "local",
            RepositoryKind::Remote => "remote",
            RepositoryKind::Virtual => "virtual",
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepositoryKind {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(RepositoryKind::Local),
            "remote" => Ok(RepositoryKind::Remote),
            "virtual" => Ok(RepositoryKind::Virtual),
            other => Err(RepoError::InvalidConfig {
                message: format!("unknown repository kind '{}'", other),
            }),
        }
    }
}

/// Repository definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySpec {
    /// Unique name for this repository
    pub name: String,

    pub kind: RepositoryKind,

    pub ecosystem: Ecosystem,

    /// Upstream base URL (remote only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Member repository names in precedence order (virtual only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<String>,

    /// Cache entry lifetime (remote only)
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub cache_ttl: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RepositorySpec {
    fn new(name: impl Into<String>, kind: RepositoryKind, ecosystem: Ecosystem) -> Self {
        Self {
            name: name.into(),
            kind,
            ecosystem,
            url: None,
            upstreams: Vec::new(),
            cache_ttl: None,
            description: None,
        }
    }

    pub fn local(name: impl Into<String>, ecosystem: Ecosystem) -> Self {
        Self::new(name, RepositoryKind::Local, ecosystem)
    }

    pub fn remote(name: impl Into<String>, ecosystem: Ecosystem, url: impl Into<String>) -> Self {
        let mut spec = Self::new(name, RepositoryKind::Remote, ecosystem);
        spec.url = Some(url.into());
        spec
    }

    pub fn virtual_(
        name: impl Into<String>,
        ecosystem: Ecosystem,
        upstreams: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut spec = Self::new(name, RepositoryKind::Virtual, ecosystem);
        spec.upstreams = upstreams.into_iter().map(Into::into).collect();
        spec
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the per-kind requirements
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(RepoError::InvalidConfig { message });

        if self.name.is_empty()
            || self.name.starts_with('.')
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return invalid(format!(
                "repository name '{}' must be non-empty and use only [A-Za-z0-9._-]",
                self.name
            ));
        }

        match self.kind {
            RepositoryKind::Remote => {
                let Some(raw) = self.url.as_deref() else {
                    return invalid(format!("remote repository {} requires a url", self.name));
                };
                let url = url::Url::parse(raw)?;
                if !matches!(url.scheme(), "http" | "https") {
                    return invalid(format!(
                        "remote repository {} url must be http(s), got {}",
                        self.name,
                        url.scheme()
                    ));
                }
            }
            RepositoryKind::Virtual => {
                if self.upstreams.is_empty() {
                    return invalid(format!(
                        "virtual repository {} requires at least one upstream",
                        self.name
                    ));
                }
                if self.upstreams.iter().any(|u| u == &self.name) {
                    return invalid(format!(
                        "virtual repository {} cannot include itself",
                        self.name
                    ));
                }
            }
            RepositoryKind::Local => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_validation() {
        assert!(RepositorySpec::local("maven-local", Ecosystem::Maven).validate().is_ok());
        assert!(RepositorySpec::local("", Ecosystem::Maven).validate().is_err());
        assert!(RepositorySpec::local("a/b", Ecosystem::Maven).validate().is_err());

        let mut remote = RepositorySpec::remote("central", Ecosystem::Maven, "https://repo1.maven.org/maven2");
        assert!(remote.validate().is_ok());
        remote.url = None;
        assert!(remote.validate().is_err());
        remote.url = Some("ftp://example.com".to_string());
        assert!(remote.validate().is_err());
        remote.url = Some("not a url".to_string());
        assert!(matches!(remote.validate(), Err(RepoError::InvalidConfig { .. })));

        let empty: [&str; 0] = [];
        assert!(RepositorySpec::virtual_("all", Ecosystem::Npm, empty).validate().is_err());
        assert!(RepositorySpec::virtual_("all", Ecosystem::Npm, ["all"]).validate().is_err());
        assert!(RepositorySpec::virtual_("all", Ecosystem::Npm, ["a", "b"]).validate().is_ok());
    }

    #[test]
    fn test_config_add_remove() {
        let mut config = DepotConfig::default();
        config.add(RepositorySpec::local("test", Ecosystem::Generic)).unwrap();

        assert!(config.get("test").is_some());
        assert!(matches!(
            config.add(RepositorySpec::local("test", Ecosystem::Npm)),
            Err(RepoError::AlreadyExists { .. })
        ));

        let removed = config.remove("test").unwrap();
        assert_eq!(removed.name, "test");
        assert!(config.get("test").is_none());
        assert!(matches!(
            config.remove("test"),
            Err(RepoError::RepositoryNotFound { .. })
        ));
    }

    #[test]
    fn test_config_serialization() {
        let yaml = r#"
apiVersion: depot.io/v1
singleFlight: true
repositories:
  - name: npm-local
    kind: local
    ecosystem: npm
  - name: npmjs
    kind: remote
    ecosystem: npm
    url: https://registry.npmjs.org
    cacheTtl: 1h
  - name: npm
    kind: virtual
    ecosystem: npm
    upstreams: [npm-local, npmjs]
"#;
        let config: DepotConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.single_flight);
        assert_eq!(config.default_cache_ttl, DEFAULT_CACHE_TTL);
        assert_eq!(config.upstream_timeout, DEFAULT_UPSTREAM_TIMEOUT);
        assert_eq!(config.names(), vec!["npm-local", "npmjs", "npm"]);
        assert_eq!(
            config.get("npmjs").unwrap().cache_ttl,
            Some(Duration::from_secs(3600))
        );

        let rendered = serde_yaml::to_string(&config).unwrap();
        let parsed: DepotConfig = serde_yaml::from_str(&rendered).unwrap();
        assert_eq!(parsed.repositories, config.repositories);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("depot.yaml");

        let mut config = DepotConfig::default();
        config
            .add(RepositorySpec::remote("pypi", Ecosystem::Pypi, "https://pypi.org"))
            .unwrap();
        config.save_to(&path).unwrap();

        let loaded = DepotConfig::load_from(&path).unwrap();
        assert_eq!(loaded.repositories, config.repositories);
    }

    #[test]
    fn test_dependency_order() {
        let specs = vec![
            RepositorySpec::virtual_("all", Ecosystem::Npm, ["group", "remote"]),
            RepositorySpec::virtual_("group", Ecosystem::Npm, ["local"]),
            RepositorySpec::local("local", Ecosystem::Npm),
            RepositorySpec::remote("remote", Ecosystem::Npm, "https://registry.npmjs.org"),
        ];
        let ordered: Vec<&str> = in_dependency_order(&specs)
            .unwrap()
            .into_iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(ordered, vec!["local", "group", "remote", "all"]);
    }

    #[test]
    fn test_dependency_cycle_rejected() {
        let specs = vec![
            RepositorySpec::virtual_("a", Ecosystem::Npm, ["b"]),
            RepositorySpec::virtual_("b", Ecosystem::Npm, ["a"]),
        ];
        assert!(matches!(
            in_dependency_order(&specs),
            Err(RepoError::InvalidConfig { .. })
        ));
    }
}
