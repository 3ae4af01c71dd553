//! Terraform module registry
//!
//! Module archives live at `modules/<namespace>/<name>/<system>/<version>.tar.gz`;
//! the module address `namespace/name/system` is the descriptor name.

use serde::Serialize;

use super::{ArtifactAdapter, group_by, require_gzip, segments, visible_versions};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub struct TerraformAdapter;

#[derive(Serialize)]
struct ModuleVersions {
    modules: Vec<ModuleEntry>,
}

#[derive(Serialize)]
struct ModuleEntry {
    source: String,
    versions: Vec<VersionEntry>,
}

#[derive(Serialize)]
struct VersionEntry {
    version: String,
}

fn valid_address_part(part: &str) -> bool {
    part.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

impl ArtifactAdapter for TerraformAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Terraform
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Terraform, path)?;
        let (namespace, name, system, file) = match segs.as_slice() {
            [root, namespace, name, system, file] if root == "modules" => (
                namespace.as_str(),
                name.as_str(),
                system.as_str(),
                file.as_str(),
            ),
            _ => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Terraform,
                    path,
                    "expected modules/<namespace>/<name>/<system>/<version>.tar.gz",
                ));
            }
        };

        if let Some(bad) = [namespace, name, system]
            .into_iter()
            .find(|p| !valid_address_part(p))
        {
            return Err(CoreError::invalid_path(
                Ecosystem::Terraform,
                path,
                format!("'{}' is not a valid module address part", bad),
            ));
        }

        let version = file.strip_suffix(".tar.gz").ok_or_else(|| {
            CoreError::invalid_path(Ecosystem::Terraform, path, "module archive must be .tar.gz")
        })?;
        semver::Version::parse(version).map_err(|e| {
            CoreError::invalid_path(
                Ecosystem::Terraform,
                path,
                format!("module version '{}' is not semver: {}", version, e),
            )
        })?;

        Ok(ArtifactDescriptor::new(
            Ecosystem::Terraform,
            format!("{}/{}/{}", namespace, name, system),
            version,
            segs.join("/"),
        )
        .with_metadata("namespace", namespace)
        .with_metadata("system", system))
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        format!("modules/{}/{}.tar.gz", descriptor.name, descriptor.version)
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_gzip(Ecosystem::Terraform, content)
    }

    /// Registry protocol `versions` response
    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let modules = group_by(descriptors, |d| d.name.clone())
            .into_iter()
            .filter_map(|(source, members)| {
                let versions: Vec<VersionEntry> = visible_versions(&members)
                    .into_iter()
                    .map(|version| VersionEntry { version })
                    .collect();
                (!versions.is_empty()).then_some(ModuleEntry { source, versions })
            })
            .collect();
        Ok(serde_json::to_vec_pretty(&ModuleVersions { modules })?)
    }
}
