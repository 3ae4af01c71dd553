//! OCI distribution layout
//!
//! `v2/<name>/manifests/<reference>` and `v2/<name>/blobs/<digest>`, where the
//! image name may span several segments (`library/nginx`, `org/team/app`).

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use super::{ArtifactAdapter, group_by, require_non_empty, segments};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub const KIND_MANIFESTS: &str = "manifests";
pub const KIND_BLOBS: &str = "blobs";

pub struct DockerAdapter;

/// `algorithm:hex` content digest
fn is_digest(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((algorithm, hex)) => {
            !algorithm.is_empty()
                && algorithm.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '_' | '-')
                })
                && hex.len() >= 32
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

fn is_tag(reference: &str) -> bool {
    let mut chars = reference.chars();
    reference.len() <= 128
        && matches!(chars.next(), Some(c) if c.is_ascii_alphanumeric() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn is_name_component(part: &str) -> bool {
    part.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
        && part.starts_with(|c: char| c.is_ascii_alphanumeric())
}

impl ArtifactAdapter for DockerAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Docker
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Docker, path)?;
        let malformed = || {
            CoreError::invalid_path(
                Ecosystem::Docker,
                path,
                "expected v2/<name>/manifests/<reference> or v2/<name>/blobs/<digest>",
            )
        };

        if segs.len() < 4 || segs[0] != "v2" {
            return Err(malformed());
        }
        let kind = segs[segs.len() - 2].as_str();
        let reference = segs[segs.len() - 1].as_str();
        let name_parts = &segs[1..segs.len() - 2];

        if let Some(bad) = name_parts.iter().find(|p| !is_name_component(p)) {
            return Err(CoreError::invalid_path(
                Ecosystem::Docker,
                path,
                format!("'{}' is not a valid image name component", bad),
            ));
        }

        match kind {
            KIND_MANIFESTS if is_tag(reference) || is_digest(reference) => {}
            KIND_BLOBS if is_digest(reference) => {}
            KIND_MANIFESTS | KIND_BLOBS => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Docker,
                    path,
                    format!("'{}' is not a valid {} reference", reference, kind),
                ));
            }
            _ => return Err(malformed()),
        }

        let name = name_parts.join("/");
        Ok(
            ArtifactDescriptor::new(Ecosystem::Docker, &name, reference, segs.join("/"))
                .with_metadata("kind", kind),
        )
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        let kind = descriptor.meta("kind").unwrap_or(KIND_MANIFESTS);
        format!("v2/{}/{}/{}", descriptor.name, kind, descriptor.version)
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_non_empty(Ecosystem::Docker, content)
    }

    fn extract_metadata(&self, content: &[u8]) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        if let Ok(Value::Object(manifest)) = serde_json::from_slice::<Value>(content) {
            if let Some(Value::String(media_type)) = manifest.get("mediaType") {
                found.insert("mediaType".to_string(), media_type.clone());
            }
            if let Some(Value::String(digest)) = manifest
                .get("config")
                .and_then(|config| config.get("digest"))
            {
                found.insert("configDigest".to_string(), digest.clone());
            }
        }
        found
    }

    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let images = group_by(descriptors, |d| d.name.clone());

        let mut repositories = Vec::new();
        let mut tags = Map::new();
        for (name, members) in &images {
            let visible: Vec<Value> = members
                .iter()
                .filter(|d| !d.yanked)
                .filter(|d| d.meta("kind").unwrap_or(KIND_MANIFESTS) == KIND_MANIFESTS)
                .filter(|d| !is_digest(&d.version))
                .map(|d| Value::String(d.version.clone()))
                .fold(Vec::new(), |mut acc, tag| {
                    if !acc.contains(&tag) {
                        acc.push(tag);
                    }
                    acc
                });
            repositories.push(Value::String(name.clone()));
            tags.insert(name.clone(), Value::Array(visible));
        }

        Ok(serde_json::to_vec_pretty(&json!({
            "repositories": repositories,
            "tags": tags,
        }))?)
    }
}
