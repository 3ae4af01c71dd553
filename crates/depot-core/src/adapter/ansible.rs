//! Ansible Galaxy collections
//!
//! Collection artifacts are `collections/<namespace>-<name>-<version>.tar.gz`.
//! Namespace and name never contain `-`, so the first two dashes delimit them.

use serde_json::{Map, Value, json};

use super::{ArtifactAdapter, group_by, require_gzip, segments, visible_versions};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub struct AnsibleAdapter;

fn valid_identifier(part: &str) -> bool {
    part.starts_with(|c: char| c.is_ascii_lowercase())
        && part
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

impl ArtifactAdapter for AnsibleAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Ansible
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Ansible, path)?;
        let stem = match segs.as_slice() {
            [root, file] if root == "collections" => file.strip_suffix(".tar.gz"),
            _ => None,
        }
        .ok_or_else(|| {
            CoreError::invalid_path(
                Ecosystem::Ansible,
                path,
                "expected collections/<namespace>-<name>-<version>.tar.gz",
            )
        })?;

        let mut parts = stem.splitn(3, '-');
        let (Some(namespace), Some(name), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CoreError::invalid_path(
                Ecosystem::Ansible,
                path,
                "collection file must be <namespace>-<name>-<version>.tar.gz",
            ));
        };

        if !valid_identifier(namespace) || !valid_identifier(name) {
            return Err(CoreError::invalid_path(
                Ecosystem::Ansible,
                path,
                format!("'{}.{}' is not a valid collection name", namespace, name),
            ));
        }
        semver::Version::parse(version).map_err(|e| {
            CoreError::invalid_path(
                Ecosystem::Ansible,
                path,
                format!("collection version '{}' is not semver: {}", version, e),
            )
        })?;

        Ok(ArtifactDescriptor::new(
            Ecosystem::Ansible,
            format!("{}.{}", namespace, name),
            version,
            segs.join("/"),
        )
        .with_metadata("namespace", namespace)
        .with_metadata("collection", name))
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        let fqcn = descriptor.name.replacen('.', "-", 1);
        format!("collections/{}-{}.tar.gz", fqcn, descriptor.version)
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_gzip(Ecosystem::Ansible, content)
    }

    /// Galaxy v3 versions listing; keyed by `namespace.name` for several collections
    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let collections = group_by(descriptors, |d| d.name.clone());
        let document = if collections.len() == 1 {
            versions_listing(&collections[0].0, &collections[0].1)
        } else {
            let mut all = Map::new();
            for (fqcn, members) in &collections {
                all.insert(fqcn.clone(), versions_listing(fqcn, members));
            }
            Value::Object(all)
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}

fn versions_listing(fqcn: &str, members: &[&ArtifactDescriptor]) -> Value {
    let (namespace, name) = fqcn.split_once('.').unwrap_or((fqcn, ""));
    let data: Vec<Value> = visible_versions(members)
        .into_iter()
        .map(|version| {
            json!({
                "href": format!(
                    "/api/v3/collections/{}/{}/versions/{}/",
                    namespace, name, version
                ),
                "version": version,
            })
        })
        .collect();
    json!({ "meta": { "count": data.len() }, "data": data })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_round_trip() {
        let path = "collections/community-general-8.1.0.tar.gz";
        let d = AnsibleAdapter.parse_path(path).unwrap();
        assert_eq!(d.name, "community.general");
        assert_eq!(d.version, "8.1.0");
        assert_eq!(d.meta("namespace"), Some("community"));
        assert_eq!(AnsibleAdapter.generate_path(&d), path);

        let pre = "collections/my_ns-my_coll-1.0.0-beta.1.tar.gz";
        let d = AnsibleAdapter.parse_path(pre).unwrap();
        assert_eq!(d.name, "my_ns.my_coll");
        assert_eq!(d.version, "1.0.0-beta.1");
        assert_eq!(AnsibleAdapter.generate_path(&d), pre);
    }

    #[test]
    fn test_parse_rejects() {
        assert!(AnsibleAdapter.parse_path("collections/community-8.1.0.tar.gz").is_err());
        assert!(AnsibleAdapter.parse_path("collections/Community-general-8.1.0.tar.gz").is_err());
        assert!(AnsibleAdapter.parse_path("community-general-8.1.0.tar.gz").is_err());
        assert!(AnsibleAdapter.parse_path("collections/a-b-latest.tar.gz").is_err());
    }

    #[test]
    fn test_versions_listing() {
        let a = AnsibleAdapter
            .parse_path("collections/ns-c-1.0.0.tar.gz")
            .unwrap();
        let mut b = AnsibleAdapter
            .parse_path("collections/ns-c-1.1.0.tar.gz")
            .unwrap();
        b.yanked = true;
        let doc: Value =
            serde_json::from_slice(&AnsibleAdapter.generate_index(&[a, b]).unwrap()).unwrap();
        assert_eq!(doc["meta"]["count"], 1);
        assert_eq!(doc["data"][0]["version"], "1.0.0");
        assert_eq!(
            doc["data"][0]["href"],
            "/api/v3/collections/ns/c/versions/1.0.0/"
        );
    }
}
