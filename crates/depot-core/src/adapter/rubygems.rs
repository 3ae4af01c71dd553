//! RubyGems layout
//!
//! Gems are stored at `gems/<name>-<version>[-<platform>].gem`. The index is
//! the compact-index `versions` file.

use super::{ArtifactAdapter, group_by, segments, split_name_version};
use crate::archive::is_tar;
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

pub struct RubygemsAdapter;

impl ArtifactAdapter for RubygemsAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Rubygems
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Rubygems, path)?;
        let stem = match segs.as_slice() {
            [root, file] if root == "gems" => file.strip_suffix(".gem"),
            _ => None,
        }
        .ok_or_else(|| {
            CoreError::invalid_path(
                Ecosystem::Rubygems,
                path,
                "expected gems/<name>-<version>[-<platform>].gem",
            )
        })?;

        let (name, rest) = split_name_version(stem).ok_or_else(|| {
            CoreError::invalid_path(Ecosystem::Rubygems, path, "gem file has no version")
        })?;

        // Gem versions never contain '-'; whatever follows is the platform
        let (version, platform) = match rest.split_once('-') {
            Some((version, platform)) if !platform.is_empty() => (version, Some(platform)),
            Some(_) => {
                return Err(CoreError::invalid_path(
                    Ecosystem::Rubygems,
                    path,
                    "empty platform",
                ));
            }
            None => (rest, None),
        };

        let mut descriptor = ArtifactDescriptor::new(
            Ecosystem::Rubygems,
            name,
            version,
            segs.join("/"),
        );
        if let Some(platform) = platform {
            descriptor = descriptor.with_metadata("platform", platform);
        }
        Ok(descriptor)
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        match descriptor.meta("platform") {
            Some(platform) => format!(
                "gems/{}-{}-{}.gem",
                descriptor.name, descriptor.version, platform
            ),
            None => format!("gems/{}-{}.gem", descriptor.name, descriptor.version),
        }
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        if is_tar(content) {
            Ok(())
        } else {
            Err(CoreError::invalid_content(
                Ecosystem::Rubygems,
                "a .gem must be a tar archive",
            ))
        }
    }

    /// Compact-index `versions`: `<name> <v>[,<v>-<platform>...] <checksum>`
    ///
    /// The trailing field is the checksum of the most recent upload.
    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let mut out = String::from("---\n");
        for (name, members) in group_by(descriptors, |d| d.name.clone()) {
            let visible: Vec<&ArtifactDescriptor> =
                members.iter().copied().filter(|d| !d.yanked).collect();
            let Some(last) = visible.last() else {
                continue;
            };

            let mut versions: Vec<String> = Vec::new();
            for d in &visible {
                let entry = match d.meta("platform") {
                    Some(platform) => format!("{}-{}", d.version, platform),
                    None => d.version.clone(),
                };
                if !versions.contains(&entry) {
                    versions.push(entry);
                }
            }

            out.push_str(&format!(
                "{} {} {}\n",
                name,
                versions.join(","),
                last.checksum_or_empty()
            ));
        }
        Ok(out.into_bytes())
    }

    fn index_content_type(&self) -> &'static str {
        "text/plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_platform() {
        let d = RubygemsAdapter
            .parse_path("gems/rails-html-sanitizer-1.6.0.gem")
            .unwrap();
        assert_eq!(d.name, "rails-html-sanitizer");
        assert_eq!(d.version, "1.6.0");
        assert_eq!(d.meta("platform"), None);

        let native = RubygemsAdapter
            .parse_path("gems/nokogiri-1.15.4-x86_64-linux.gem")
            .unwrap();
        assert_eq!(native.name, "nokogiri");
        assert_eq!(native.version, "1.15.4");
        assert_eq!(native.meta("platform"), Some("x86_64-linux"));
    }

    #[test]
    fn test_round_trip() {
        for path in [
            "gems/rake-13.0.6.gem",
            "gems/nokogiri-1.15.4-x86_64-linux.gem",
            "gems/rails-7.1.0.beta1.gem",
        ] {
            let d = RubygemsAdapter.parse_path(path).unwrap();
            assert_eq!(RubygemsAdapter.generate_path(&d), path);
        }
    }

    #[test]
    fn test_parse_rejects() {
        assert!(RubygemsAdapter.parse_path("gems/rake.gem").is_err());
        assert!(RubygemsAdapter.parse_path("rake-13.0.6.gem").is_err());
        assert!(RubygemsAdapter.parse_path("gems/rake-13.0.6.tgz").is_err());
        assert!(RubygemsAdapter.parse_path("gems/rake-13.0.6-.gem").is_err());
    }

    #[test]
    fn test_versions_file() {
        let mut a = RubygemsAdapter.parse_path("gems/rake-13.0.0.gem").unwrap();
        a.checksum = Some("c1".to_string());
        let mut b = RubygemsAdapter.parse_path("gems/rake-13.0.6.gem").unwrap();
        b.checksum = Some("c2".to_string());
        let mut gone = RubygemsAdapter.parse_path("gems/old-1.0.0.gem").unwrap();
        gone.yanked = true;

        let out =
            String::from_utf8(RubygemsAdapter.generate_index(&[a, b, gone]).unwrap()).unwrap();
        assert_eq!(out, "---\nrake 13.0.0,13.0.6 c2\n");
    }

    #[test]
    fn test_validate_content() {
        let mut tar = vec![0u8; 512];
        tar[257..262].copy_from_slice(b"ustar");
        assert!(RubygemsAdapter.validate_content(&tar).is_ok());
        assert!(RubygemsAdapter.validate_content(&[0x1f, 0x8b]).is_err());
    }
}
