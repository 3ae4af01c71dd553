//! File-based content store
//!
//! Each object is one file below the root directory. Writes go to a sibling
//! temporary file first and are renamed into place, so a reader never sees a
//! half-written object.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use super::{ContentStore, StoreError, StoreResult, check_path};

const TMP_SUFFIX: &str = ".depot-tmp";

/// File-based content store
#[derive(Debug, Clone)]
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    /// Create a store rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, path: &str) -> StoreResult<PathBuf> {
        check_path(path)?;
        Ok(self.root.join(path))
    }

    fn not_found(path: &str) -> StoreError {
        StoreError::NotFound {
            path: path.to_string(),
        }
    }

    async fn metadata(&self, path: &str) -> StoreResult<std::fs::Metadata> {
        let file = self.object_path(path)?;
        match tokio::fs::metadata(&file).await {
            Ok(meta) if meta.is_file() => Ok(meta),
            Ok(_) => Err(Self::not_found(path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(path)),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn store(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        let file = self.object_path(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = file.clone().into_os_string();
        tmp.push(TMP_SUFFIX);
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &file).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn retrieve(&self, path: &str) -> StoreResult<Vec<u8>> {
        let file = self.object_path(path)?;
        match tokio::fs::read(&file).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(path)),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        let file = self.object_path(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(path)),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let listed = tokio::task::spawn_blocking(move || -> StoreResult<Vec<String>> {
            let mut paths = Vec::new();
            for entry in WalkDir::new(&root).min_depth(1) {
                let entry = entry.map_err(|e| {
                    std::io::Error::other(format!("walking {}: {}", root.display(), e))
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let relative = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if relative.ends_with(TMP_SUFFIX) || !relative.starts_with(&prefix) {
                    continue;
                }
                paths.push(relative);
            }
            paths.sort();
            Ok(paths)
        })
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))??;

        Ok(listed)
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        match self.metadata(path).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        Ok(self.metadata(path).await?.len())
    }

    async fn checksum(&self, path: &str) -> StoreResult<String> {
        let file = self.object_path(path)?;
        let mut handle = match tokio::fs::File::open(&file).await {
            Ok(h) => h,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Self::not_found(path));
            }
            Err(e) => return Err(e.into()),
        };

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = handle.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sha256_hex;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileContentStore) {
        let dir = TempDir::new().unwrap();
        let store = FileContentStore::new(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_store_retrieve_delete() {
        let (_dir, store) = store();
        store.store("local/r/a/b.bin", b"payload").await.unwrap();

        assert!(store.exists("local/r/a/b.bin").await.unwrap());
        assert_eq!(store.retrieve("local/r/a/b.bin").await.unwrap(), b"payload");
        assert_eq!(store.size("local/r/a/b.bin").await.unwrap(), 7);
        assert_eq!(
            store.checksum("local/r/a/b.bin").await.unwrap(),
            sha256_hex(b"payload")
        );

        store.delete("local/r/a/b.bin").await.unwrap();
        assert!(!store.exists("local/r/a/b.bin").await.unwrap());
        assert!(matches!(
            store.retrieve("local/r/a/b.bin").await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let (_dir, store) = store();
        store.store("x", b"one").await.unwrap();
        store.store("x", b"second").await.unwrap();
        assert_eq!(store.retrieve("x").await.unwrap(), b"second");
        assert_eq!(store.list("").await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let (_dir, store) = store();
        for path in ["local/a/2", "local/a/1", "local/b/1", "cache/a/1"] {
            store.store(path, b"x").await.unwrap();
        }
        assert_eq!(
            store.list("local/a/").await.unwrap(),
            vec!["local/a/1", "local/a/2"]
        );
        assert!(store.list("nothing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let (_dir, store) = store();
        assert!(matches!(
            store.store("../outside", b"x").await,
            Err(StoreError::InvalidPath { .. })
        ));
        assert!(matches!(
            store.retrieve("/etc/passwd").await,
            Err(StoreError::InvalidPath { .. })
        ));
    }
}
