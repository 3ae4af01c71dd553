//! PyPI simple repository
//!
//! Distributions are stored at `packages/<project>/<version>/<filename>`.
//! Index pages follow PEP 503 and address projects by their normalized name.

use super::{ArtifactAdapter, group_by, segments};
use crate::archive::{is_gzip, is_zip};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

const DIST_EXTENSIONS: [&str; 5] = [".tar.gz", ".whl", ".zip", ".tar.bz2", ".egg"];

pub struct PypiAdapter;

/// PEP 503 name normalization
///
/// ```
/// assert_eq!(depot_core::pypi_normalize("My_Pkg.Name"), "my-pkg-name");
/// ```
pub fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

impl ArtifactAdapter for PypiAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Pypi
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Pypi, path)?;
        let (project, version, filename) = match segs.as_slice() {
            [root, project, version, filename] if root == "packages" => {
                (project.as_str(), version.as_str(), filename.as_str())
            }
            _ => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Pypi,
                    path,
                    "expected packages/<project>/<version>/<filename>",
                ));
            }
        };

        if !DIST_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
            return Err(CoreError::invalid_path(
                Ecosystem::Pypi,
                path,
                "not a recognised distribution file",
            ));
        }

        // The version must end where the wheel tags or the extension begin
        let marker = format!("-{}", version);
        let candidates: Vec<&str> = filename
            .match_indices(&marker)
            .filter(|(pos, _)| {
                let rest = &filename[pos + marker.len()..];
                rest.starts_with('-') || DIST_EXTENSIONS.contains(&rest)
            })
            .map(|(pos, _)| &filename[..pos])
            .collect();
        if candidates.is_empty() {
            return Err(CoreError::invalid_path(
                Ecosystem::Pypi,
                path,
                format!("file name does not carry version {}", version),
            ));
        }
        if !candidates
            .iter()
            .any(|dist_name| normalize(dist_name) == normalize(project))
        {
            return Err(CoreError::invalid_path(
                Ecosystem::Pypi,
                path,
                format!("distribution '{}' does not belong to '{}'", candidates[0], project),
            ));
        }

        Ok(
            ArtifactDescriptor::new(Ecosystem::Pypi, project, version, segs.join("/"))
                .with_metadata("filename", filename)
                .with_metadata("normalized_name", normalize(project)),
        )
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        let filename = descriptor
            .meta("filename")
            .map(String::from)
            .unwrap_or_else(|| format!("{}-{}.tar.gz", descriptor.name, descriptor.version));
        format!(
            "packages/{}/{}/{}",
            descriptor.name, descriptor.version, filename
        )
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        if is_gzip(content) || is_zip(content) {
            Ok(())
        } else {
            Err(CoreError::invalid_content(
                Ecosystem::Pypi,
                "expected an sdist (gzip) or wheel (zip)",
            ))
        }
    }

    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let projects = group_by(descriptors, |d| normalize(&d.name));

        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n  <head>\n    <meta name=\"pypi:repository-version\" content=\"1.0\">\n    <title>Simple index</title>\n  </head>\n  <body>\n",
        );
        for (normalized, members) in &projects {
            if members.iter().all(|d| d.yanked) {
                continue;
            }
            html.push_str(&format!(
                "    <a href=\"/simple/{}/\">{}</a>\n",
                escape(normalized),
                escape(normalized)
            ));
        }
        html.push_str("  </body>\n</html>\n");
        Ok(html.into_bytes())
    }

    fn index_content_type(&self) -> &'static str {
        "text/html"
    }
}

/// PEP 503 project page listing every file of one project
///
/// Yanked files stay listed with `data-yanked` (PEP 592).
pub fn project_page(project: &str, descriptors: &[ArtifactDescriptor]) -> String {
    let normalized = normalize(project);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n  <head>\n    <meta name=\"pypi:repository-version\" content=\"1.0\">\n    <title>Links for {}</title>\n  </head>\n  <body>\n    <h1>Links for {}</h1>\n",
        escape(&normalized),
        escape(&normalized)
    );
    for d in descriptors.iter().filter(|d| normalize(&d.name) == normalized) {
        let filename = d.meta("filename").unwrap_or(&d.path);
        let mut href = format!("/{}", d.path);
        if let Some(checksum) = &d.checksum {
            href.push_str("#sha256=");
            href.push_str(checksum);
        }
        let yanked = if d.yanked { " data-yanked=\"\"" } else { "" };
        html.push_str(&format!(
            "    <a href=\"{}\"{}>{}</a>\n",
            escape(&href),
            yanked,
            escape(filename)
        ));
    }
    html.push_str("  </body>\n</html>\n");
    html
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
