//! Cargo registry layout
//!
//! Crate files are stored at `crates/<name>/<name>-<version>.crate`. The index
//! follows the sparse-registry format: one JSON object per version, one line
//! each, under a path sharded by the lowercased crate name (see [`index_path`]).

use serde::Serialize;
use std::collections::BTreeMap;

use super::{ArtifactAdapter, require_gzip, segments};
use crate::archive::read_tgz_member;
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

/// Index schema version written into every entry
pub const INDEX_SCHEMA_VERSION: u32 = 2;

pub struct CargoAdapter;

/// Sharded index path for a crate name
///
/// ```
/// use depot_core::cargo_index_path;
/// assert_eq!(cargo_index_path("a"), "1/a");
/// assert_eq!(cargo_index_path("ab"), "2/ab");
/// assert_eq!(cargo_index_path("abc"), "3/a/abc");
/// assert_eq!(cargo_index_path("Serde_Json"), "se/rd/serde_json");
/// ```
pub fn index_path(name: &str) -> String {
    let name = name.to_lowercase();
    let chars: Vec<char> = name.chars().collect();
    match chars.len() {
        0 => String::new(),
        1 => format!("1/{}", name),
        2 => format!("2/{}", name),
        3 => format!("3/{}/{}", chars[0], name),
        _ => {
            let first: String = chars[..2].iter().collect();
            let second: String = chars[2..4].iter().collect();
            format!("{}/{}/{}", first, second, name)
        }
    }
}

/// Registry `config.json` pointing clients at download and API endpoints
pub fn registry_config(download_url: &str, api_url: &str) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct RegistryConfig<'a> {
        dl: &'a str,
        api: &'a str,
    }
    Ok(serde_json::to_vec(&RegistryConfig {
        dl: download_url,
        api: api_url,
    })?)
}

fn valid_crate_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl ArtifactAdapter for CargoAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Cargo
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Cargo, path)?;
        let (name, file) = match segs.as_slice() {
            [root, name, file] if root == "crates" => (name.as_str(), file.as_str()),
            _ => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Cargo,
                    path,
                    "expected crates/<name>/<name>-<version>.crate",
                ));
            }
        };

        if !valid_crate_name(name) {
            return Err(CoreError::invalid_path(
                Ecosystem::Cargo,
                path,
                format!("'{}' is not a valid crate name", name),
            ));
        }

        let version = file
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(".crate"))
            .ok_or_else(|| {
                CoreError::invalid_path(
                    Ecosystem::Cargo,
                    path,
                    format!("crate file must be {}-<version>.crate", name),
                )
            })?;

        semver::Version::parse(version).map_err(|e| {
            CoreError::invalid_path(
                Ecosystem::Cargo,
                path,
                format!("'{}' is not a semver version: {}", version, e),
            )
        })?;

        Ok(ArtifactDescriptor::new(
            Ecosystem::Cargo,
            name,
            version,
            format!("crates/{}/{}-{}.crate", name, name, version),
        ))
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        format!(
            "crates/{}/{}-{}.crate",
            descriptor.name, descriptor.name, descriptor.version
        )
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_gzip(Ecosystem::Cargo, content)
    }

    fn extract_metadata(&self, content: &[u8]) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        let manifest = read_tgz_member(content, |p| {
            p.ends_with("/Cargo.toml") && p.matches('/').count() == 1
        });
        if let Ok(Some(bytes)) = manifest {
            let text = String::from_utf8_lossy(&bytes);
            for key in ["description", "license", "repository"] {
                if let Some(value) = toml_string_value(&text, key) {
                    found.insert(key.to_string(), value);
                }
            }
        }
        found
    }

    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for d in descriptors {
            let entry = IndexEntry {
                name: &d.name,
                vers: &d.version,
                deps: d
                    .dependencies
                    .iter()
                    .map(|dep| IndexDependency {
                        name: &dep.name,
                        req: &dep.requirement,
                        features: Vec::new(),
                        optional: dep.optional,
                        default_features: true,
                        target: None,
                        kind: dep.kind.as_deref().unwrap_or("normal"),
                    })
                    .collect(),
                cksum: d.checksum_or_empty(),
                features: BTreeMap::new(),
                yanked: d.yanked,
                v: INDEX_SCHEMA_VERSION,
            };
            serde_json::to_writer(&mut out, &entry)?;
            out.push(b'\n');
        }
        Ok(out)
    }

    fn index_content_type(&self) -> &'static str {
        "text/plain"
    }
}

#[derive(Serialize)]
struct IndexEntry<'a> {
    name: &'a str,
    vers: &'a str,
    deps: Vec<IndexDependency<'a>>,
    cksum: &'a str,
    features: BTreeMap<String, Vec<String>>,
    yanked: bool,
    v: u32,
}

#[derive(Serialize)]
struct IndexDependency<'a> {
    name: &'a str,
    req: &'a str,
    features: Vec<String>,
    optional: bool,
    default_features: bool,
    target: Option<&'a str>,
    kind: &'a str,
}

/// `key = "value"` from the `[package]` table of a Cargo.toml
fn toml_string_value(text: &str, key: &str) -> Option<String> {
    let mut in_package = false;
    for line in text.lines().map(str::trim) {
        if line.starts_with('[') {
            in_package = line == "[package]";
            continue;
        }
        if !in_package {
            continue;
        }
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        if k.trim() == key {
            let v = v.trim();
            if let Some(inner) = v.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
                return Some(inner.to_string());
            }
        }
    }
    None
}
