//! Go module proxy layout
//!
//! `<module>/@v/<version>.info`, `.mod` and `.zip`. Module paths and versions
//! are case-encoded on the wire: every uppercase letter is written as `!`
//! followed by its lowercase form.

use serde_json::Value;
use std::collections::BTreeMap;

use super::{ArtifactAdapter, group_by, require_non_empty, segments, visible_versions};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

const FILE_KINDS: [&str; 3] = ["info", "mod", "zip"];
const DEFAULT_FILE: &str = "zip";

pub struct GoAdapter;

/// Case-encode a module path or version for the wire
pub fn encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Reverse of [`encode`]; `None` for malformed input
pub fn decode(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '!' => match chars.next() {
                Some(next) if next.is_ascii_lowercase() => out.push(next.to_ascii_uppercase()),
                _ => return None,
            },
            c if c.is_ascii_uppercase() => return None,
            c => out.push(c),
        }
    }
    Some(out)
}

impl ArtifactAdapter for GoAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Golang
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Golang, path)?;
        let at = segs.iter().position(|s| s == "@v");
        let (module_parts, file) = match at {
            Some(pos) if pos > 0 && pos + 2 == segs.len() => (&segs[..pos], segs[pos + 1].as_str()),
            _ => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Golang,
                    path,
                    "expected <module>/@v/<version>.(info|mod|zip)",
                ));
            }
        };

        let (encoded_version, kind) = file
            .rsplit_once('.')
            .filter(|(_, ext)| FILE_KINDS.contains(ext))
            .ok_or_else(|| {
                CoreError::invalid_path(
                    Ecosystem::Golang,
                    path,
                    format!("'{}' is not a .info, .mod or .zip file", file),
                )
            })?;

        let module = decode(&module_parts.join("/")).ok_or_else(|| {
            CoreError::invalid_path(Ecosystem::Golang, path, "malformed case-encoded module path")
        })?;
        let version = decode(encoded_version).ok_or_else(|| {
            CoreError::invalid_path(Ecosystem::Golang, path, "malformed case-encoded version")
        })?;

        if !version.starts_with('v') || version.len() < 2 {
            return Err(CoreError::invalid_path(
                Ecosystem::Golang,
                path,
                format!("module version '{}' must start with 'v'", version),
            ));
        }

        Ok(ArtifactDescriptor::new(
            Ecosystem::Golang,
            &module,
            &version,
            format!("{}/@v/{}.{}", encode(&module), encode(&version), kind),
        )
        .with_metadata("file", kind))
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        let kind = descriptor.meta("file").unwrap_or(DEFAULT_FILE);
        format!(
            "{}/@v/{}.{}",
            encode(&descriptor.name),
            encode(&descriptor.version),
            kind
        )
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_non_empty(Ecosystem::Golang, content)
    }

    fn extract_metadata(&self, content: &[u8]) -> BTreeMap<String, String> {
        let mut found = BTreeMap::new();

        // .info: {"Version": "...", "Time": "..."}
        if let Ok(Value::Object(info)) = serde_json::from_slice::<Value>(content) {
            if let Some(Value::String(time)) = info.get("Time") {
                found.insert("time".to_string(), time.clone());
            }
            return found;
        }

        // .mod: first `module` directive
        if let Ok(text) = std::str::from_utf8(content) {
            let module = text
                .lines()
                .map(str::trim)
                .find_map(|line| line.strip_prefix("module "))
                .map(|m| m.trim().trim_matches('"'));
            if let Some(module) = module {
                found.insert("module".to_string(), module.to_string());
            }
        }
        found
    }

    /// `@v/list`: one version per line. When several modules are listed, each
    /// line is prefixed with its module path.
    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let modules = group_by(descriptors, |d| d.name.clone());
        let mut out = String::new();
        let prefixed = modules.len() > 1;
        for (module, members) in &modules {
            for version in visible_versions(members) {
                if prefixed {
                    out.push_str(module);
                    out.push(' ');
                }
                out.push_str(&version);
                out.push('\n');
            }
        }
        Ok(out.into_bytes())
    }

    fn index_content_type(&self) -> &'static str {
        "text/plain"
    }
}
