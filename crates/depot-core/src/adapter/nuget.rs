//! NuGet flat container
//!
//! Packages are addressed by lowercase id and normalized version:
//! `<id>/<version>/<id>.<version>.nupkg`.

use serde_json::{Map, Value, json};

use super::{ArtifactAdapter, group_by, segments, visible_versions};
use crate::archive::is_zip;
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub struct NugetAdapter;

impl ArtifactAdapter for NugetAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Nuget
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Nuget, path)?;
        let (id, version, file) = match segs.as_slice() {
            [id, version, file] => (id.as_str(), version.as_str(), file.as_str()),
            _ => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Nuget,
                    path,
                    "expected <id>/<version>/<id>.<version>.nupkg",
                ));
            }
        };

        if path.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(CoreError::invalid_path(
                Ecosystem::Nuget,
                path,
                "flat container paths are lowercase",
            ));
        }
        if !version.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(CoreError::invalid_path(
                Ecosystem::Nuget,
                path,
                format!("'{}' is not a package version", version),
            ));
        }
        if file != format!("{}.{}.nupkg", id, version) {
            return Err(CoreError::invalid_path(
                Ecosystem::Nuget,
                path,
                format!("package file must be {}.{}.nupkg", id, version),
            ));
        }

        Ok(ArtifactDescriptor::new(
            Ecosystem::Nuget,
            id,
            version,
            segs.join("/"),
        ))
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        let id = descriptor.name.to_lowercase();
        let version = descriptor.version.to_lowercase();
        format!("{}/{}/{}.{}.nupkg", id, version, id, version)
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        if is_zip(content) {
            Ok(())
        } else {
            Err(CoreError::invalid_content(
                Ecosystem::Nuget,
                "a .nupkg must be a zip archive",
            ))
        }
    }

    /// `{"versions": [...]}` for one package id; keyed by id for several
    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let packages = group_by(descriptors, |d| d.name.to_lowercase());
        let document = if packages.len() == 1 {
            json!({ "versions": visible_versions(&packages[0].1) })
        } else {
            let mut all = Map::new();
            for (id, members) in &packages {
                all.insert(id.clone(), json!({ "versions": visible_versions(members) }));
            }
            Value::Object(all)
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_round_trip() {
        let path = "newtonsoft.json/13.0.3/newtonsoft.json.13.0.3.nupkg";
        let d = NugetAdapter.parse_path(path).unwrap();
        assert_eq!(d.name, "newtonsoft.json");
        assert_eq!(d.version, "13.0.3");
        assert_eq!(NugetAdapter.generate_path(&d), path);
    }

    #[test]
    fn test_generate_lowercases() {
        let d = ArtifactDescriptor::new(Ecosystem::Nuget, "Serilog", "3.1.0-Beta", "");
        assert_eq!(
            NugetAdapter.generate_path(&d),
            "serilog/3.1.0-beta/serilog.3.1.0-beta.nupkg"
        );
    }

    #[test]
    fn test_parse_rejects() {
        assert!(NugetAdapter.parse_path("Serilog/3.1.0/Serilog.3.1.0.nupkg").is_err());
        assert!(NugetAdapter.parse_path("serilog/3.1.0/other.3.1.0.nupkg").is_err());
        assert!(NugetAdapter.parse_path("serilog/latest/serilog.latest.nupkg").is_err());
        assert!(NugetAdapter.parse_path("serilog/3.1.0").is_err());
    }

    #[test]
    fn test_index() {
        let a = NugetAdapter
            .parse_path("serilog/3.0.0/serilog.3.0.0.nupkg")
            .unwrap();
        let mut b = NugetAdapter
            .parse_path("serilog/3.1.0/serilog.3.1.0.nupkg")
            .unwrap();
        b.yanked = true;
        let doc: Value =
            serde_json::from_slice(&NugetAdapter.generate_index(&[a, b]).unwrap()).unwrap();
        assert_eq!(doc, json!({ "versions": ["3.0.0"] }));
    }

    #[test]
    fn test_validate_content() {
        assert!(NugetAdapter.validate_content(b"PK\x03\x04...").is_ok());
        assert!(NugetAdapter.validate_content(&[0x1f, 0x8b]).is_err());
    }
}
