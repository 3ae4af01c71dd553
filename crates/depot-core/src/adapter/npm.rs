//! npm registry layout
//!
//! Tarballs live at `<name>/-/<name>-<version>.tgz`; scoped packages add the
//! scope as a leading directory: `@scope/<name>/-/<name>-<version>.tgz`.
//! A scope written as a single `@scope%2Fname` segment is accepted too and
//! normalized to the two-segment form.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

use super::{ArtifactAdapter, group_by, require_gzip, segments};
use crate::archive::read_tgz_member;
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub struct NpmAdapter;

impl ArtifactAdapter for NpmAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let mut segs = segments(Ecosystem::Npm, path)?;

        // `@scope%2Fname` → `@scope`, `name`
        if segs[0].starts_with('@') {
            let lower = segs[0].to_ascii_lowercase();
            if let Some(pos) = lower.find("%2f") {
                let first = segs.remove(0);
                segs.insert(0, first[pos + 3..].to_string());
                segs.insert(0, first[..pos].to_string());
            }
        }

        let (scope, bare, file) = match segs.as_slice() {
            [scope, bare, dash, file] if scope.starts_with('@') && dash == "-" => {
                (Some(scope.as_str()), bare.as_str(), file.as_str())
            }
            [bare, dash, file] if !bare.starts_with('@') && dash == "-" => {
                (None, bare.as_str(), file.as_str())
            }
            _ => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Npm,
                    path,
                    "expected [@scope/]<name>/-/<name>-<version>.tgz",
                ));
            }
        };

        if scope == Some("@") {
            return Err(CoreError::invalid_path(Ecosystem::Npm, path, "empty scope"));
        }

        let version = file
            .strip_prefix(bare)
            .and_then(|rest| rest.strip_prefix('-'))
            .and_then(|rest| rest.strip_suffix(".tgz"))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CoreError::invalid_path(
                    Ecosystem::Npm,
                    path,
                    format!("tarball name must be {}-<version>.tgz", bare),
                )
            })?;

        let name = match scope {
            Some(scope) => format!("{}/{}", scope, bare),
            None => bare.to_string(),
        };

        let mut descriptor =
            ArtifactDescriptor::new(Ecosystem::Npm, &name, version, tarball_path(&name, version))
                .with_metadata("scoped", scope.is_some().to_string());
        if let Some(scope) = scope {
            descriptor = descriptor.with_metadata("scope", scope);
        }
        Ok(descriptor)
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        tarball_path(&descriptor.name, &descriptor.version)
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_gzip(Ecosystem::Npm, content)
    }

    fn extract_metadata(&self, content: &[u8]) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();
        let manifest = match read_tgz_member(content, |p| p == "package/package.json") {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return found,
            Err(e) => {
                tracing::debug!("npm tarball not readable for metadata: {}", e);
                return found;
            }
        };

        if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(&manifest) {
            for key in ["description", "license", "homepage"] {
                if let Some(Value::String(s)) = fields.get(key) {
                    found.insert(key.to_string(), s.clone());
                }
            }
        }
        found
    }

    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let packages = group_by(descriptors, |d| d.name.clone());

        let document = if packages.len() == 1 {
            let (name, members) = &packages[0];
            packument(name, members)
        } else {
            let mut all = Map::new();
            for (name, members) in &packages {
                all.insert(name.clone(), packument(name, members));
            }
            Value::Object(all)
        };

        Ok(serde_json::to_vec_pretty(&document)?)
    }
}

/// Split `@scope/name` into its scope and bare name
fn split_scoped(name: &str) -> (Option<&str>, &str) {
    match name.split_once('/') {
        Some((scope, bare)) if scope.starts_with('@') => (Some(scope), bare),
        _ => (None, name),
    }
}

fn tarball_path(name: &str, version: &str) -> String {
    let (scope, bare) = split_scoped(name);
    match scope {
        Some(scope) => format!("{}/{}/-/{}-{}.tgz", scope, bare, bare, version),
        None => format!("{}/-/{}-{}.tgz", bare, bare, version),
    }
}

/// Tarball URL as written into a packument; the scope separator is `%2F`
fn tarball_url(name: &str, version: &str) -> String {
    let (scope, bare) = split_scoped(name);
    match scope {
        Some(scope) => format!("/{}%2F{}/-/{}-{}.tgz", scope, bare, bare, version),
        None => format!("/{}/-/{}-{}.tgz", bare, bare, version),
    }
}

fn packument(name: &str, members: &[&ArtifactDescriptor]) -> Value {
    let mut versions = Map::new();
    let mut latest: Option<&str> = None;

    for d in members.iter().filter(|d| !d.yanked) {
        let shasum = d.meta("shasum").unwrap_or(d.checksum_or_empty());
        versions.insert(
            d.version.clone(),
            json!({
                "name": name,
                "version": d.version,
                "dist": {
                    "tarball": tarball_url(name, &d.version),
                    "shasum": shasum,
                },
            }),
        );
        latest = Some(d.version.as_str());
    }

    let mut dist_tags = Map::new();
    if let Some(latest) = latest {
        dist_tags.insert("latest".to_string(), Value::String(latest.to_string()));
    }

    json!({
        "name": name,
        "versions": versions,
        "dist-tags": dist_tags,
    })
}
