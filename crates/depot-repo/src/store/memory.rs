//! In-memory content store for testing
//!
//! Objects live in a sorted map. Every call is counted, and any operation can
//! be made to fail on demand.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::{ContentStore, StoreError, StoreResult, check_path, sha256_hex};

/// In-memory content store
#[derive(Clone, Default)]
pub struct MemoryContentStore {
    objects: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    operations: Arc<RwLock<StoreOperationCounts>>,
    failing: Arc<RwLock<HashSet<&'static str>>>,
}

/// Counts of store calls for testing assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreOperationCounts {
    pub stores: usize,
    pub retrieves: usize,
    pub deletes: usize,
    pub lists: usize,
    pub exists: usize,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `operation` fail (`"store"`, `"delete"`, ...)
    pub fn fail_operation(&self, operation: &'static str) {
        self.failing.write().insert(operation);
    }

    pub fn clear_failures(&self) {
        self.failing.write().clear();
    }

    pub fn operation_counts(&self) -> StoreOperationCounts {
        self.operations.read().clone()
    }

    pub fn reset_counts(&self) {
        *self.operations.write() = StoreOperationCounts::default();
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    fn guard(&self, operation: &'static str, path: &str) -> StoreResult<()> {
        if self.failing.read().contains(operation) {
            return Err(StoreError::Injected { operation });
        }
        check_path(path)
    }

    fn get(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.objects
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn store(&self, path: &str, content: &[u8]) -> StoreResult<()> {
        self.operations.write().stores += 1;
        self.guard("store", path)?;
        self.objects
            .write()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn retrieve(&self, path: &str) -> StoreResult<Vec<u8>> {
        self.operations.write().retrieves += 1;
        self.guard("retrieve", path)?;
        self.get(path)
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.operations.write().deletes += 1;
        self.guard("delete", path)?;
        self.objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound {
                path: path.to_string(),
            })
    }

    async fn list(&self, prefix: &str) -> StoreResult<Vec<String>> {
        self.operations.write().lists += 1;
        if self.failing.read().contains("list") {
            return Err(StoreError::Injected { operation: "list" });
        }
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        self.operations.write().exists += 1;
        self.guard("exists", path)?;
        Ok(self.objects.read().contains_key(path))
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        self.guard("size", path)?;
        Ok(self.get(path)?.len() as u64)
    }

    async fn checksum(&self, path: &str) -> StoreResult<String> {
        self.guard("checksum", path)?;
        Ok(sha256_hex(&self.get(path)?))
    }
}
