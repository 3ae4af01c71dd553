//! Credentials of remote upstreams
//!
//! The credential file maps remote repository names to secrets. When the
//! engine starts, the entries of remote repositories become `Authorization`
//! values scoped to each repository's URL, so one HTTP client can serve every
//! remote without offering a secret to another upstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{RepositoryKind, RepositorySpec};
use crate::error::{RepoError, Result};

/// Secret of one remote repository
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    Basic { username: String, password: String },
    Bearer { token: String },
    /// Username and password read from the environment at startup
    Env {
        username_var: String,
        password_var: String,
    },
}

impl Credentials {
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::Bearer {
            token: token.into(),
        }
    }

    pub fn from_env(username_var: impl Into<String>, password_var: impl Into<String>) -> Self {
        Credentials::Env {
            username_var: username_var.into(),
            password_var: password_var.into(),
        }
    }

    /// `Authorization` header value
    pub fn authorization(&self) -> Result<String> {
        match self {
            Credentials::Basic { username, password } => Ok(basic(username, password)),
            Credentials::Bearer { token } => Ok(format!("Bearer {}", token)),
            Credentials::Env {
                username_var,
                password_var,
            } => {
                let username = env_var(username_var)?;
                let password = env_var(password_var)?;
                Ok(basic(&username, &password))
            }
        }
    }
}

// Secrets stay out of logs and error output
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credentials::Bearer { .. } => f.debug_struct("Bearer").field("token", &"***").finish(),
            Credentials::Env {
                username_var,
                password_var,
            } => f
                .debug_struct("Env")
                .field("username_var", username_var)
                .field("password_var", password_var)
                .finish(),
        }
    }
}

fn basic(username: &str, password: &str) -> String {
    let encoded = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        format!("{}:{}", username, password),
    );
    format!("Basic {}", encoded)
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| RepoError::InvalidConfig {
        message: format!("environment variable {} is not set", name),
    })
}

/// Credential file: secrets by remote repository name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialStore {
    #[serde(default)]
    credentials: BTreeMap<String, Credentials>,
}

impl CredentialStore {
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write the file readable by the owner only on unix
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)?;
            std::io::Write::write_all(&mut file, content.as_bytes())?;
        }

        #[cfg(not(unix))]
        std::fs::write(path, content)?;

        Ok(())
    }

    /// `<config dir>/depot/credentials.yaml`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("depot").join("credentials.yaml"))
    }

    pub fn set(&mut self, repository: &str, credentials: Credentials) {
        self.credentials.insert(repository.to_string(), credentials);
    }

    pub fn get(&self, repository: &str) -> Option<&Credentials> {
        self.credentials.get(repository)
    }

    pub fn remove(&mut self, repository: &str) -> Option<Credentials> {
        self.credentials.remove(repository)
    }

    pub fn has(&self, repository: &str) -> bool {
        self.credentials.contains_key(repository)
    }

    /// Authorization of every remote spec that has credentials, scoped to its URL
    ///
    /// Entries of local and virtual repositories are ignored.
    pub fn scoped_for(&self, specs: &[RepositorySpec]) -> Result<UpstreamAuth> {
        let mut auth = UpstreamAuth::default();
        for spec in specs.iter().filter(|s| s.kind == RepositoryKind::Remote) {
            let (Some(url), Some(credentials)) = (spec.url.as_deref(), self.get(&spec.name)) else {
                continue;
            };
            let header = credentials.authorization().map_err(|e| match e {
                RepoError::InvalidConfig { message } => RepoError::InvalidConfig {
                    message: format!("credentials of '{}': {}", spec.name, message),
                },
                other => other,
            })?;
            auth.insert(&spec.name, url, header);
        }
        Ok(auth)
    }
}

#[derive(Clone)]
struct Scope {
    repository: String,
    prefix: String,
    header: String,
}

/// `Authorization` values keyed by upstream URL prefix
///
/// A URL matches a prefix on whole path segments; the longest match wins.
#[derive(Clone, Default)]
pub struct UpstreamAuth {
    // Longest prefix first
    scopes: Vec<Scope>,
}

impl UpstreamAuth {
    /// Register `header` for every URL under `url_prefix`, replacing an equal prefix
    pub fn insert(&mut self, repository: &str, url_prefix: &str, header: impl Into<String>) {
        let prefix = url_prefix.trim_end_matches('/').to_string();
        self.scopes.retain(|s| s.prefix != prefix);
        self.scopes.push(Scope {
            repository: repository.to_string(),
            prefix,
            header: header.into(),
        });
        self.scopes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    /// Header value for `url`, if some remote's URL covers it
    pub fn for_url(&self, url: &str) -> Option<&str> {
        self.scopes
            .iter()
            .find(|s| {
                url.strip_prefix(s.prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            })
            .map(|s| s.header.as_str())
    }
}

impl fmt::Debug for UpstreamAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.scopes.iter().map(|s| (&s.repository, &s.prefix)))
            .finish()
    }
}
