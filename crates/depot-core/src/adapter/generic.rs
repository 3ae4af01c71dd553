//! Generic file store
//!
//! `[<group>/...]<name>/<version>/<file>`: the last three segments are name,
//! version and file name; anything before them is the group.

use serde::Serialize;

use super::{ArtifactAdapter, require_non_empty, segments};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub struct GenericAdapter;

#[derive(Serialize)]
struct Listing<'a> {
    artifacts: Vec<ListingEntry<'a>>,
}

#[derive(Serialize)]
struct ListingEntry<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<&'a str>,
    name: &'a str,
    version: &'a str,
    path: &'a str,
    size: u64,
    checksum: &'a str,
}

impl ArtifactAdapter for GenericAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Generic
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Generic, path)?;
        let [group @ .., name, version, file] = segs.as_slice() else {
            return Err(CoreError::invalid_path(
                Ecosystem::Generic,
                path,
                "expected [<group>/]<name>/<version>/<file>",
            ));
        };

        let mut descriptor =
            ArtifactDescriptor::new(Ecosystem::Generic, name, version, segs.join("/"))
                .with_metadata("file", file);
        if !group.is_empty() {
            descriptor = descriptor.with_metadata("group", group.join("/"));
        }
        Ok(descriptor)
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        let file = descriptor.meta("file").unwrap_or(&descriptor.name);
        match descriptor.meta("group") {
            Some(group) => format!(
                "{}/{}/{}/{}",
                group, descriptor.name, descriptor.version, file
            ),
            None => format!("{}/{}/{}", descriptor.name, descriptor.version, file),
        }
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_non_empty(Ecosystem::Generic, content)
    }

    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let artifacts = descriptors
            .iter()
            .filter(|d| !d.yanked)
            .map(|d| ListingEntry {
                group: d.meta("group"),
                name: &d.name,
                version: &d.version,
                path: &d.path,
                size: d.size,
                checksum: d.checksum_or_empty(),
            })
            .collect();
        Ok(serde_json::to_vec_pretty(&Listing { artifacts })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_parse_grouped_and_round_trip() {
        let path = "tools/linux/cli/2.1.0/cli-linux-amd64.tar.gz";
        let d = GenericAdapter.parse_path(path).unwrap();
        assert_eq!(d.name, "cli");
        assert_eq!(d.version, "2.1.0");
        assert_eq!(d.meta("group"), Some("tools/linux"));
        assert_eq!(d.meta("file"), Some("cli-linux-amd64.tar.gz"));
        assert_eq!(GenericAdapter.generate_path(&d), path);
    }

    #[test]
    fn test_parse_ungrouped() {
        let d = GenericAdapter.parse_path("notes/1/notes.txt").unwrap();
        assert_eq!(d.meta("group"), None);
        assert_eq!(GenericAdapter.generate_path(&d), "notes/1/notes.txt");
        assert!(GenericAdapter.parse_path("notes/notes.txt").is_err());
    }

    #[test]
    fn test_file_fallback() {
        let bare = ArtifactDescriptor::new(Ecosystem::Generic, "blob", "7", "");
        assert_eq!(GenericAdapter.generate_path(&bare), "blob/7/blob");
    }

    #[test]
    fn test_listing() {
        let mut d = GenericAdapter.parse_path("g/a/1/a.bin").unwrap();
        d.size = 3;
        d.checksum = Some("ff".to_string());
        let doc: Value =
            serde_json::from_slice(&GenericAdapter.generate_index(&[d]).unwrap()).unwrap();
        assert_eq!(doc["artifacts"][0]["group"], "g");
        assert_eq!(doc["artifacts"][0]["size"], 3);
        assert_eq!(doc["artifacts"][0]["path"], "g/a/1/a.bin");
    }

    #[test]
    fn test_validate_content() {
        assert!(GenericAdapter.validate_content(b"x").is_ok());
        assert!(GenericAdapter.validate_content(b"").is_err());
    }
}
