//! Helm chart repository
//!
//! Packaged charts are stored flat at `charts/<name>-<version>.tgz` and listed
//! in an `index.yaml` document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{ArtifactAdapter, group_by, require_gzip, segments, split_name_version};
use crate::archive::read_tgz_member;
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub struct HelmAdapter;

/// Repository `index.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    pub api_version: String,

    /// Chart versions by chart name, newest upload first
    pub entries: BTreeMap<String, Vec<ChartVersion>>,

    /// Most recent upload among the listed charts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<DateTime<Utc>>,
}

/// One chart version in the index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartVersion {
    pub name: String,
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub urls: Vec<String>,

    #[serde(default)]
    pub digest: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

/// Subset of `Chart.yaml` read for metadata
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartFile {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    app_version: Option<String>,
}

impl ArtifactAdapter for HelmAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Helm
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Helm, path)?;
        let stem = match segs.as_slice() {
            [root, file] if root == "charts" => file.strip_suffix(".tgz"),
            _ => None,
        }
        .ok_or_else(|| {
            CoreError::invalid_path(Ecosystem::Helm, path, "expected charts/<name>-<version>.tgz")
        })?;

        let (name, version) = split_name_version(stem).ok_or_else(|| {
            CoreError::invalid_path(Ecosystem::Helm, path, "chart file has no version")
        })?;

        semver::Version::parse(version).map_err(|e| {
            CoreError::invalid_path(
                Ecosystem::Helm,
                path,
                format!("chart version '{}' is not semver: {}", version, e),
            )
        })?;

        Ok(ArtifactDescriptor::new(
            Ecosystem::Helm,
            name,
            version,
            format!("charts/{}-{}.tgz", name, version),
        ))
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        format!("charts/{}-{}.tgz", descriptor.name, descriptor.version)
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_gzip(Ecosystem::Helm, content)
    }

    fn extract_metadata(&self, content: &[u8]) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        let chart = read_tgz_member(content, |p| {
            p.ends_with("/Chart.yaml") && p.matches('/').count() == 1
        });
        let Ok(Some(bytes)) = chart else {
            return found;
        };

        match serde_yaml::from_slice::<ChartFile>(&bytes) {
            Ok(chart) => {
                if let Some(description) = chart.description {
                    found.insert("description".to_string(), description);
                }
                if let Some(app_version) = chart.app_version {
                    found.insert("appVersion".to_string(), app_version);
                }
            }
            Err(e) => tracing::debug!("Chart.yaml not readable: {}", e),
        }
        found
    }

    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let mut entries = BTreeMap::new();
        for (name, members) in group_by(descriptors, |d| d.name.clone()) {
            let versions: Vec<ChartVersion> = members
                .iter()
                .rev()
                .filter(|d| !d.yanked)
                .map(|d| ChartVersion {
                    name: d.name.clone(),
                    version: d.version.clone(),
                    app_version: d.meta("appVersion").map(String::from),
                    description: d.meta("description").map(String::from),
                    urls: vec![self.generate_path(d)],
                    digest: d.checksum_or_empty().to_string(),
                    created: d.upload_time,
                })
                .collect();
            if !versions.is_empty() {
                entries.insert(name, versions);
            }
        }

        let index = ChartIndex {
            api_version: "v1".to_string(),
            entries,
            generated: descriptors.iter().filter_map(|d| d.upload_time).max(),
        };
        Ok(serde_yaml::to_string(&index)?.into_bytes())
    }

    fn index_content_type(&self) -> &'static str {
        "application/x-yaml"
    }
}
