//! Maven repository layout
//!
//! `<group/as/dirs>/<artifactId>/<version>/<artifactId>-<version>[-<classifier>].<ext>`
//!
//! Timestamped snapshot files (`myapp-1.0-20240101.120000-3.jar` inside a
//! `1.0-SNAPSHOT` directory) keep their file version in `snapshotVersion`.

use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeMap;

use super::{ArtifactAdapter, group_by, require_non_empty, segments, visible_versions};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

/// Group segment used when a descriptor carries no `groupId`
pub const DEFAULT_GROUP: &str = "default";

/// Extension used when a descriptor carries no `extension`
pub const DEFAULT_EXTENSION: &str = "jar";

const SNAPSHOT_SUFFIX: &str = "-SNAPSHOT";

pub struct MavenAdapter;

impl ArtifactAdapter for MavenAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Maven
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Maven, path)?;
        if segs.len() < 4 {
            return Err(CoreError::invalid_path(
                Ecosystem::Maven,
                path,
                "expected <group>/<artifactId>/<version>/<file>",
            ));
        }

        let n = segs.len();
        let artifact_id = &segs[n - 3];
        let version = &segs[n - 2];
        let filename = &segs[n - 1];
        let group_id = segs[..n - 3].join(".");

        let (file_version, remainder) = split_file_version(artifact_id, version, filename)
            .ok_or_else(|| {
                CoreError::invalid_path(
                    Ecosystem::Maven,
                    path,
                    format!("file name does not start with {}-{}", artifact_id, version),
                )
            })?;

        let (classifier, extension) = if let Some(rest) = remainder.strip_prefix('-') {
            match rest.split_once('.') {
                Some((classifier, ext)) if !classifier.is_empty() => (Some(classifier), ext),
                _ => {
                    return Err(CoreError::invalid_path(
                        Ecosystem::Maven,
                        path,
                        "classifier must be followed by an extension",
                    ));
                }
            }
        } else if let Some(ext) = remainder.strip_prefix('.') {
            (None, ext)
        } else {
            return Err(CoreError::invalid_path(
                Ecosystem::Maven,
                path,
                "missing file extension",
            ));
        };

        if extension.is_empty() {
            return Err(CoreError::invalid_path(
                Ecosystem::Maven,
                path,
                "missing file extension",
            ));
        }

        let mut descriptor =
            ArtifactDescriptor::new(Ecosystem::Maven, artifact_id, version, segs.join("/"))
                .with_metadata("groupId", group_id)
                .with_metadata("artifactId", artifact_id)
                .with_metadata("extension", extension);
        if let Some(classifier) = classifier {
            descriptor = descriptor.with_metadata("classifier", classifier);
        }
        if file_version != *version {
            descriptor = descriptor.with_metadata("snapshotVersion", file_version);
        }
        Ok(descriptor)
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        let group = descriptor.meta("groupId").unwrap_or(DEFAULT_GROUP);
        let artifact_id = descriptor.meta("artifactId").unwrap_or(&descriptor.name);
        let file_version = descriptor
            .meta("snapshotVersion")
            .unwrap_or(&descriptor.version);
        let extension = descriptor.meta("extension").unwrap_or(DEFAULT_EXTENSION);

        let mut filename = format!("{}-{}", artifact_id, file_version);
        if let Some(classifier) = descriptor.meta("classifier") {
            filename.push('-');
            filename.push_str(classifier);
        }
        filename.push('.');
        filename.push_str(extension);

        format!(
            "{}/{}/{}/{}",
            group.replace('.', "/"),
            artifact_id,
            descriptor.version,
            filename
        )
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_non_empty(Ecosystem::Maven, content)
    }

    fn extract_metadata(&self, content: &[u8]) -> BTreeMap<String, String> {
        if !content.trim_ascii_start().starts_with(b"<") {
            return BTreeMap::new();
        }
        match std::str::from_utf8(content) {
            Ok(xml) => pom_metadata(xml),
            Err(_) => BTreeMap::new(),
        }
    }

    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let groups = group_by(descriptors, |d| {
            format!(
                "{}:{}",
                d.meta("groupId").unwrap_or(DEFAULT_GROUP),
                d.meta("artifactId").unwrap_or(&d.name)
            )
        });

        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;

        // A single coordinate renders as a plain maven-metadata.xml; several are
        // wrapped so the document stays well-formed.
        let wrapped = groups.len() != 1;
        if wrapped {
            write(&mut writer, Event::Start(BytesStart::new("repository")))?;
        }
        for (_, members) in &groups {
            write_metadata(&mut writer, members)?;
        }
        if wrapped {
            write(&mut writer, Event::End(BytesEnd::new("repository")))?;
        }

        let mut out = writer.into_inner();
        out.push(b'\n');
        Ok(out)
    }

    fn index_content_type(&self) -> &'static str {
        "application/xml"
    }
}

/// Split a file name into its version and the classifier/extension remainder
fn split_file_version<'a>(
    artifact_id: &str,
    version: &str,
    filename: &'a str,
) -> Option<(String, &'a str)> {
    let prefix = format!("{}-{}", artifact_id, version);
    if let Some(rest) = filename.strip_prefix(&prefix) {
        return Some((version.to_string(), rest));
    }

    // Timestamped snapshot: <base>-<yyyyMMdd.HHmmss>-<build>
    let base = version.strip_suffix(SNAPSHOT_SUFFIX)?;
    let rest = filename.strip_prefix(&format!("{}-{}-", artifact_id, base))?;
    let (stamp, after) = rest.split_at_checked(15)?;
    let (date, time) = stamp.split_once('.')?;
    if date.len() != 8
        || time.len() != 6
        || !date.bytes().chain(time.bytes()).all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let after = after.strip_prefix('-')?;
    let build_len = after.bytes().take_while(|b| b.is_ascii_digit()).count();
    if build_len == 0 {
        return None;
    }
    let (build, remainder) = after.split_at(build_len);
    Some((format!("{}-{}-{}", base, stamp, build), remainder))
}

fn write_metadata(writer: &mut Writer<Vec<u8>>, members: &[&ArtifactDescriptor]) -> Result<()> {
    let first = members[0];
    let group_id = first.meta("groupId").unwrap_or(DEFAULT_GROUP);
    let artifact_id = first.meta("artifactId").unwrap_or(&first.name);
    let versions = visible_versions(members);

    write(writer, Event::Start(BytesStart::new("metadata")))?;
    text_element(writer, "groupId", group_id)?;
    text_element(writer, "artifactId", artifact_id)?;

    write(writer, Event::Start(BytesStart::new("versioning")))?;
    if let Some(latest) = versions.last() {
        text_element(writer, "latest", latest)?;
    }
    if let Some(release) = versions.iter().rev().find(|v| !v.ends_with(SNAPSHOT_SUFFIX)) {
        text_element(writer, "release", release)?;
    }
    write(writer, Event::Start(BytesStart::new("versions")))?;
    for version in &versions {
        text_element(writer, "version", version)?;
    }
    write(writer, Event::End(BytesEnd::new("versions")))?;
    if let Some(updated) = members.iter().filter_map(|d| d.upload_time).max() {
        text_element(writer, "lastUpdated", &last_updated(updated))?;
    }
    write(writer, Event::End(BytesEnd::new("versioning")))?;

    write(writer, Event::End(BytesEnd::new("metadata")))
}

fn last_updated(time: DateTime<Utc>) -> String {
    time.format("%Y%m%d%H%M%S").to_string()
}

fn text_element(writer: &mut Writer<Vec<u8>>, name: &str, value: &str) -> Result<()> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(value)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| CoreError::index_render(Ecosystem::Maven, e))
}

/// Top-level `<name>`, `<description>` and `<packaging>` of a POM
fn pom_metadata(xml: &str) -> BTreeMap<String, String> {
    let mut found = BTreeMap::new();
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut current: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if depth == 2 && matches!(name.as_str(), "name" | "description" | "packaging") {
                    current = Some(name);
                }
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                current = None;
            }
            Ok(Event::Text(e)) => {
                if let Some(key) = &current {
                    if let Ok(text) = e.unescape() {
                        let text = text.trim();
                        if !text.is_empty() {
                            found.insert(key.clone(), text.to_string());
                        }
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> MavenAdapter {
        MavenAdapter
    }

    #[test]
    fn test_parse_jar() {
        let d = adapter()
            .parse_path("com/example/myapp/1.0.0/myapp-1.0.0.jar")
            .unwrap();
        assert_eq!(d.name, "myapp");
        assert_eq!(d.version, "1.0.0");
        assert_eq!(d.meta("groupId"), Some("com.example"));
        assert_eq!(d.meta("extension"), Some("jar"));
        assert_eq!(d.meta("classifier"), None);
    }

    #[test]
    fn test_parse_classifier_and_compound_extension() {
        let d = adapter()
            .parse_path("org/acme/lib/2.1/lib-2.1-sources.jar")
            .unwrap();
        assert_eq!(d.meta("classifier"), Some("sources"));
        assert_eq!(d.meta("extension"), Some("jar"));

        let d = adapter()
            .parse_path("org/acme/lib/2.1/lib-2.1.pom.sha1")
            .unwrap();
        assert_eq!(d.meta("extension"), Some("pom.sha1"));
    }

    #[test]
    fn test_parse_timestamped_snapshot() {
        let path = "org/acme/lib/1.0-SNAPSHOT/lib-1.0-20240101.120000-3.jar";
        let d = adapter().parse_path(path).unwrap();
        assert_eq!(d.version, "1.0-SNAPSHOT");
        assert_eq!(d.meta("snapshotVersion"), Some("1.0-20240101.120000-3"));
        assert_eq!(adapter().generate_path(&d), path);
    }

    #[test]
    fn test_parse_rejects_bad_paths() {
        assert!(adapter().parse_path("myapp/1.0/myapp-1.0.jar").is_err());
        assert!(adapter().parse_path("com/x/myapp/1.0/other-1.0.jar").is_err());
        assert!(adapter().parse_path("com/x/myapp/1.0/myapp-1.0").is_err());
        assert!(adapter().parse_path("com/x/myapp/1.0/myapp-1.0-.jar").is_err());
        assert!(adapter().parse_path("com/x/myapp/maven-metadata.xml").is_err());
    }

    #[test]
    fn test_round_trip() {
        for path in [
            "com/example/myapp/1.0.0/myapp-1.0.0.jar",
            "com/example/myapp/1.0.0/myapp-1.0.0.pom",
            "org/acme/lib/2.1/lib-2.1-sources.jar",
            "io/x/y/z/tool/0.1/tool-0.1.tar.gz",
        ] {
            let d = adapter().parse_path(path).unwrap();
            assert_eq!(adapter().generate_path(&d), path);
        }
    }

    #[test]
    fn test_generate_path_without_group_falls_back() {
        let d = ArtifactDescriptor::new(Ecosystem::Maven, "myapp", "1.0.0", "");
        assert_eq!(
            adapter().generate_path(&d),
            "default/myapp/1.0.0/myapp-1.0.0.jar"
        );
    }

    #[test]
    fn test_index_latest_is_upload_order() {
        let descriptors: Vec<_> = ["2.0.0", "1.0.0", "1.5.0-SNAPSHOT"]
            .iter()
            .map(|v| {
                adapter()
                    .parse_path(&format!("com/example/myapp/{v}/myapp-{v}.jar"))
                    .unwrap()
            })
            .collect();

        let xml = String::from_utf8(adapter().generate_index(&descriptors).unwrap()).unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<groupId>com.example</groupId>"));
        assert!(xml.contains("<artifactId>myapp</artifactId>"));
        assert!(xml.contains("<latest>1.5.0-SNAPSHOT</latest>"));
        assert!(xml.contains("<release>1.0.0</release>"));
        assert_eq!(xml.matches("<version>").count(), 3);
        assert!(!xml.contains("<repository>"));
    }

    #[test]
    fn test_index_dedups_versions_and_skips_yanked() {
        let mut descriptors = vec![
            adapter()
                .parse_path("com/example/myapp/1.0/myapp-1.0.jar")
                .unwrap(),
            adapter()
                .parse_path("com/example/myapp/1.0/myapp-1.0.pom")
                .unwrap(),
            adapter()
                .parse_path("com/example/myapp/1.1/myapp-1.1.jar")
                .unwrap(),
        ];
        descriptors[2].yanked = true;

        let xml = String::from_utf8(adapter().generate_index(&descriptors).unwrap()).unwrap();
        assert_eq!(xml.matches("<version>").count(), 1);
        assert!(xml.contains("<latest>1.0</latest>"));
    }

    #[test]
    fn test_index_wraps_multiple_artifacts() {
        let descriptors = vec![
            adapter().parse_path("a/b/one/1/one-1.jar").unwrap(),
            adapter().parse_path("a/b/two/1/two-1.jar").unwrap(),
        ];
        let xml = String::from_utf8(adapter().generate_index(&descriptors).unwrap()).unwrap();
        assert!(xml.contains("<repository>"));
        assert_eq!(xml.matches("<metadata>").count(), 2);
    }

    #[test]
    fn test_extract_pom_metadata() {
        let pom = br#"<?xml version="1.0"?>
<project>
  <name>My App</name>
  <description>Does things &amp; stuff</description>
  <packaging>jar</packaging>
  <dependencies><dependency><name>ignored</name></dependency></dependencies>
</project>"#;
        let meta = adapter().extract_metadata(pom);
        assert_eq!(meta.get("name").map(String::as_str), Some("My App"));
        assert_eq!(
            meta.get("description").map(String::as_str),
            Some("Does things & stuff")
        );
        assert_eq!(meta.get("packaging").map(String::as_str), Some("jar"));

        assert!(adapter().extract_metadata(b"PK\x03\x04binary").is_empty());
    }
}
