//! Content stores holding artifact bytes
//!
//! Two reference backends ship with the engine:
//! - **File**: objects under a root directory, one file per path
//! - **Memory**: a map in memory, with operation counters and failure injection for tests
//!
//! Repositories never see the shared store directly. Each one gets a
//! [`PrefixedStore`] view (`local/<name>/...` or `cache/<name>/...`) so two
//! repositories can never address each other's objects.

mod file;
mod memory;

pub use file::FileContentStore;
pub use memory::{MemoryContentStore, StoreOperationCounts};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Content store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {path}")]
    NotFound { path: String },

    #[error("invalid object path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("injected {operation} failure")]
    Injected { operation: &'static str },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Byte storage addressed by slash-separated relative paths
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Write (or overwrite) an object
    async fn store(&self, path: &str, content: &[u8]) -> StoreResult<()>;

    async fn retrieve(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Remove an object; `NotFound` when absent
    async fn delete(&self, path: &str) -> StoreResult<()>;

    /// Paths starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>>;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    async fn size(&self, path: &str) -> StoreResult<u64>;

    /// Lowercase hex SHA-256 of the stored bytes
    async fn checksum(&self, path: &str) -> StoreResult<String>;
}

/// Lowercase hex SHA-256
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Reject paths that could escape a store root
pub(crate) fn check_path(path: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    if path.is_empty() {
        return Err(invalid("empty path"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(invalid("path must be relative and slash-separated"));
    }
    if path
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(invalid("empty or relative path segment"));
    }
    Ok(())
}

/// A repository's private view of a shared store
#[derive(Clone)]
pub struct PrefixedStore {
    inner: Arc<dyn ContentStore>,
    prefix: String,
}

impl PrefixedStore {
    pub fn new(inner: Arc<dyn ContentStore>, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        Self { inner, prefix }
    }

    /// Objects owned by a local repository
    pub fn local(inner: Arc<dyn ContentStore>, repository: &str) -> Self {
        Self::new(inner, format!("local/{}", repository))
    }

    /// Objects cached by a remote repository
    pub fn cache(inner: Arc<dyn ContentStore>, repository: &str) -> Self {
        Self::new(inner, format!("cache/{}", repository))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn full(&self, path: &str) -> StoreResult<String> {
        let path = path.trim_start_matches('/');
        check_path(path)?;
        Ok(format!("{}/{}", self.prefix, path))
    }

    pub async fn store(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        self.inner.store(&self.full(path)?, content).await
    }

    pub async fn retrieve(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.inner.retrieve(&self.full(path)?).await
    }

    pub async fn delete(&self, path: &str) -> StoreResult<()> {
        self.inner.delete(&self.full(path)?).await
    }

    pub async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.inner.exists(&self.full(path)?).await
    }

    pub async fn size(&self, path: &str) -> StoreResult<u64> {
        self.inner.size(&self.full(path)?).await
    }

    pub async fn checksum(&self, path: &str) -> StoreResult<String> {
        self.inner.checksum(&self.full(path)?).await
    }

    /// Repository-relative paths under `prefix`
    pub async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let root = format!("{}/", self.prefix);
        let query = format!("{}{}", root, prefix.trim_start_matches('/'));
        let paths = self.inner.list(&query).await?;
        Ok(paths
            .into_iter()
            .filter_map(|p| p.strip_prefix(&root).map(String::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_path() {
        assert!(check_path("a/b/c.jar").is_ok());
        assert!(check_path("").is_err());
        assert!(check_path("/etc/passwd").is_err());
        assert!(check_path("a/../../b").is_err());
        assert!(check_path("a//b").is_err());
        assert!(check_path("a\\b").is_err());
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_prefixed_views_are_isolated() {
        let shared: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
        let a = PrefixedStore::local(shared.clone(), "a");
        let ab = PrefixedStore::local(shared.clone(), "ab");
        let cache = PrefixedStore::cache(shared.clone(), "a");

        a.store("x/1.bin", b"one").await.unwrap();
        ab.store("x/2.bin", b"two").await.unwrap();
        cache.store("x/3.bin", b"three").await.unwrap();

        assert_eq!(a.list("").await.unwrap(), vec!["x/1.bin"]);
        assert_eq!(ab.list("x/").await.unwrap(), vec!["x/2.bin"]);
        assert!(!a.exists("x/2.bin").await.unwrap());
        assert_eq!(cache.retrieve("x/3.bin").await.unwrap(), b"three");
        assert!(shared.exists("local/a/x/1.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_prefixed_rejects_traversal() {
        let shared: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
        let a = PrefixedStore::local(shared, "a");
        let err = a.store("../b/evil", b"x").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath { .. }));
    }
}
