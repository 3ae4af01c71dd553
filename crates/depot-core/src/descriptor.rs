//! Artifact descriptors
//!
//! A descriptor is the structured record derived from (or destined for) a wire
//! path. `size`, `checksum` and `upload_time` are filled in by the repository
//! after the content store accepted the bytes; callers never set them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ecosystem::Ecosystem;

/// One stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDescriptor {
    /// Owning repository name
    #[serde(default)]
    pub repository: String,

    /// Ecosystem-meaningful name (`@scope/name`, `artifactId`, crate name, ...)
    pub name: String,

    /// Version string as the ecosystem spells it
    pub version: String,

    /// Protocol this artifact belongs to
    pub ecosystem: Ecosystem,

    /// Canonical storage-relative path, unique within a repository
    pub path: String,

    /// Size in bytes, as reported by the content store
    #[serde(default)]
    pub size: u64,

    /// Lowercase hex SHA-256, as reported by the content store
    #[serde(default)]
    pub checksum: Option<String>,

    /// When the bytes were written
    #[serde(default)]
    pub upload_time: Option<DateTime<Utc>>,

    /// Ecosystem-specific facts; keys are owned by the adapter that set them
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Declared dependencies, when the ecosystem records them in its index
    #[serde(default)]
    pub dependencies: Vec<ArtifactDependency>,

    /// Hidden from protocol indices without removing bytes
    #[serde(default)]
    pub yanked: bool,
}

impl ArtifactDescriptor {
    /// Create a descriptor with no storage facts filled in
    pub fn new(
        ecosystem: Ecosystem,
        name: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            repository: String::new(),
            name: name.into(),
            version: version.into(),
            ecosystem,
            path: path.into(),
            size: 0,
            checksum: None,
            upload_time: None,
            metadata: BTreeMap::new(),
            dependencies: Vec::new(),
            yanked: false,
        }
    }

    /// Builder-style metadata insertion
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builder-style dependency insertion
    pub fn with_dependency(mut self, dependency: ArtifactDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Look up a metadata value
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(|s| s.as_str())
    }

    /// Grouping coordinate, whichever key the adapter used for it
    ///
    /// Maven `groupId`, npm `scope`, Ansible/Terraform `namespace`, generic `group`.
    pub fn group(&self) -> Option<&str> {
        ["groupId", "scope", "namespace", "group"]
            .iter()
            .find_map(|key| self.meta(key))
    }

    /// Checksum or an empty string when the store has not reported one yet
    pub fn checksum_or_empty(&self) -> &str {
        self.checksum.as_deref().unwrap_or("")
    }
}

/// Dependency declared by an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactDependency {
    pub name: String,

    /// Version requirement in the ecosystem's own syntax
    pub requirement: String,

    /// `normal`, `dev`, `build`, ... when the ecosystem distinguishes them
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub optional: bool,
}

impl ArtifactDependency {
    pub fn new(name: impl Into<String>, requirement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirement: requirement.into(),
            kind: None,
            optional: false,
        }
    }
}
