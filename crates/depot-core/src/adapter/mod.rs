//! Per-ecosystem artifact adapters
//!
//! Every ecosystem implements [`ArtifactAdapter`]: a stateless translator
//! between wire paths, [`ArtifactDescriptor`]s and the ecosystem's index
//! document. The set is closed; [`adapter_for`] dispatches over [`Ecosystem`]
//! and [`create_adapter`] does the same from a string tag.
//!
//! Descriptor slices passed to `generate_index` are in upload order. Adapters
//! that report a "latest" version take the last matching descriptor rather than
//! the highest semantic version.

use std::collections::BTreeMap;

use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub mod ansible;
pub mod cargo;
pub mod conan;
pub mod docker;
pub mod generic;
pub mod golang;
pub mod helm;
pub mod maven;
pub mod npm;
pub mod nuget;
pub mod pypi;
pub mod rubygems;
pub mod terraform;

/// Translator between wire paths, descriptors and index documents
pub trait ArtifactAdapter: Send + Sync {
    /// Ecosystem this adapter speaks
    fn ecosystem(&self) -> Ecosystem;

    /// Parse a wire path into a descriptor
    ///
    /// Paths outside the ecosystem's grammar fail with `InvalidPath` naming the path.
    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor>;

    /// Canonical path for a descriptor; the inverse of [`parse_path`](Self::parse_path)
    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String;

    /// Cheap protocol-specific sniff of uploaded bytes
    fn validate_content(&self, content: &[u8]) -> Result<()>;

    /// Best-effort metadata enrichment; never fails
    fn extract_metadata(&self, _content: &[u8]) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Render the ecosystem's listing document
    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>>;

    /// Media type of the rendered index
    fn index_content_type(&self) -> &'static str {
        "application/json"
    }
}

/// Adapter for an ecosystem
pub fn adapter_for(ecosystem: Ecosystem) -> Box<dyn ArtifactAdapter> {
    match ecosystem {
        Ecosystem::Maven => Box::new(maven::MavenAdapter),
        Ecosystem::Npm => Box::new(npm::NpmAdapter),
        Ecosystem::Docker => Box::new(docker::DockerAdapter),
        Ecosystem::Pypi => Box::new(pypi::PypiAdapter),
        Ecosystem::Helm => Box::new(helm::HelmAdapter),
        Ecosystem::Golang => Box::new(golang::GoAdapter),
        Ecosystem::Cargo => Box::new(cargo::CargoAdapter),
        Ecosystem::Nuget => Box::new(nuget::NugetAdapter),
        Ecosystem::Rubygems => Box::new(rubygems::RubygemsAdapter),
        Ecosystem::Terraform => Box::new(terraform::TerraformAdapter),
        Ecosystem::Ansible => Box::new(ansible::AnsibleAdapter),
        Ecosystem::Conan => Box::new(conan::ConanAdapter),
        Ecosystem::Generic => Box::new(generic::GenericAdapter),
    }
}

/// Adapter for a string tag; unknown tags fail with `UnsupportedEcosystem`
pub fn create_adapter(tag: &str) -> Result<Box<dyn ArtifactAdapter>> {
    let ecosystem: Ecosystem = tag.parse()?;
    Ok(adapter_for(ecosystem))
}

/// Every tag [`create_adapter`] accepts
pub fn supported_tags() -> Vec<&'static str> {
    Ecosystem::ALL.iter().map(|e| e.as_str()).collect()
}

/// Split a wire path into non-empty segments, rejecting traversal
pub(crate) fn segments(ecosystem: Ecosystem, path: &str) -> Result<Vec<String>> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(CoreError::invalid_path(ecosystem, path, "empty path"));
    }

    let parts: Vec<String> = trimmed.split('/').map(String::from).collect();
    for part in &parts {
        if part.is_empty() {
            return Err(CoreError::invalid_path(ecosystem, path, "empty path segment"));
        }
        if part == "." || part == ".." {
            return Err(CoreError::invalid_path(
                ecosystem,
                path,
                "relative path segments are not allowed",
            ));
        }
    }
    Ok(parts)
}

/// Split `name-version` at the first `-` that is followed by a digit
pub(crate) fn split_name_version(stem: &str) -> Option<(&str, &str)> {
    let bytes = stem.as_bytes();
    (1..bytes.len().saturating_sub(1))
        .find(|&i| bytes[i] == b'-' && bytes[i + 1].is_ascii_digit())
        .map(|i| (&stem[..i], &stem[i + 1..]))
}

pub(crate) fn require_non_empty(ecosystem: Ecosystem, content: &[u8]) -> Result<()> {
    if content.is_empty() {
        return Err(CoreError::invalid_content(ecosystem, "content is empty"));
    }
    Ok(())
}

pub(crate) fn require_gzip(ecosystem: Ecosystem, content: &[u8]) -> Result<()> {
    if !crate::archive::is_gzip(content) {
        return Err(CoreError::invalid_content(
            ecosystem,
            "expected a gzip-compressed archive",
        ));
    }
    Ok(())
}

/// Versions in first-seen order, without duplicates, skipping yanked entries
pub(crate) fn visible_versions(descriptors: &[&ArtifactDescriptor]) -> Vec<String> {
    let mut versions: Vec<String> = Vec::new();
    for d in descriptors.iter().filter(|d| !d.yanked) {
        if !versions.contains(&d.version) {
            versions.push(d.version.clone());
        }
    }
    versions
}

/// Group descriptors by a key, keeping first-seen key order and upload order within a group
pub(crate) fn group_by<'a, F>(
    descriptors: &'a [ArtifactDescriptor],
    key: F,
) -> Vec<(String, Vec<&'a ArtifactDescriptor>)>
where
    F: Fn(&ArtifactDescriptor) -> String,
{
    let mut groups: Vec<(String, Vec<&'a ArtifactDescriptor>)> = Vec::new();
    for d in descriptors {
        let k = key(d);
        match groups.iter_mut().find(|(existing, _)| *existing == k) {
            Some((_, members)) => members.push(d),
            None => groups.push((k, vec![d])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_covers_every_tag() {
        for tag in supported_tags() {
            let adapter = create_adapter(tag).unwrap();
            assert_eq!(adapter.ecosystem().as_str(), tag);
        }
        assert_eq!(supported_tags().len(), Ecosystem::ALL.len());
    }

    #[test]
    fn test_factory_rejects_unknown() {
        let err = create_adapter("cocoapods").err().unwrap();
        assert!(matches!(err, CoreError::UnsupportedEcosystem { .. }));
    }

    #[test]
    fn test_segments() {
        assert_eq!(
            segments(Ecosystem::Generic, "/a/b/c").unwrap(),
            vec!["a", "b", "c"]
        );
        assert!(segments(Ecosystem::Generic, "a//b").is_err());
        assert!(segments(Ecosystem::Generic, "a/../b").is_err());
        assert!(segments(Ecosystem::Generic, "").is_err());
    }

    #[test]
    fn test_split_name_version() {
        assert_eq!(split_name_version("nginx-15.0.0"), Some(("nginx", "15.0.0")));
        assert_eq!(
            split_name_version("cert-manager-1.2.0-rc1"),
            Some(("cert-manager", "1.2.0-rc1"))
        );
        assert_eq!(split_name_version("nodigits"), None);
        assert_eq!(split_name_version("-1.0"), None);
    }

    #[test]
    fn test_invalid_path_names_offender() {
        for ecosystem in Ecosystem::ALL {
            let err = adapter_for(ecosystem).parse_path("").unwrap_err();
            assert!(matches!(err, CoreError::InvalidPath { .. }), "{ecosystem}");
        }
        let err = adapter_for(Ecosystem::Cargo)
            .parse_path("not/a/crate.txt")
            .unwrap_err();
        assert!(err.to_string().contains("not/a/crate.txt"));
    }
}
