//! Conan recipe layout
//!
//! Recipe files are stored at `<name>/<version>/<user>/<channel>/<file>`. A
//! reference without user and channel uses `_` for both.

use serde::Serialize;

use super::{ArtifactAdapter, require_non_empty, segments};
use crate::descriptor::ArtifactDescriptor;
use crate::ecosystem::Ecosystem;
use crate::error::{CoreError, Result};

const NO_USER_CHANNEL: &str = "_";
const DEFAULT_FILE: &str = "conan_export.tgz";

pub struct ConanAdapter;

#[derive(Serialize)]
struct SearchResults {
    results: Vec<String>,
}

/// `name/version[@user/channel]`
pub fn reference(descriptor: &ArtifactDescriptor) -> String {
    let user = descriptor.meta("user").unwrap_or(NO_USER_CHANNEL);
    let channel = descriptor.meta("channel").unwrap_or(NO_USER_CHANNEL);
    if user == NO_USER_CHANNEL && channel == NO_USER_CHANNEL {
        format!("{}/{}", descriptor.name, descriptor.version)
    } else {
        format!(
            "{}/{}@{}/{}",
            descriptor.name, descriptor.version, user, channel
        )
    }
}

impl ArtifactAdapter for ConanAdapter {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Conan
    }

    fn parse_path(&self, path: &str) -> Result<ArtifactDescriptor> {
        let segs = segments(Ecosystem::Conan, path)?;
        let [name, version, user, channel, file] = segs.as_slice() else {
            return Err(CoreError::invalid_path(
                Ecosystem::Conan,
                path,
                "expected <name>/<version>/<user>/<channel>/<file>",
            ));
        };

        Ok(ArtifactDescriptor::new(
            Ecosystem::Conan,
            name,
            version,
            segs.join("/"),
        )
        .with_metadata("user", user)
        .with_metadata("channel", channel)
        .with_metadata("file", file))
    }

    fn generate_path(&self, descriptor: &ArtifactDescriptor) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            descriptor.name,
            descriptor.version,
            descriptor.meta("user").unwrap_or(NO_USER_CHANNEL),
            descriptor.meta("channel").unwrap_or(NO_USER_CHANNEL),
            descriptor.meta("file").unwrap_or(DEFAULT_FILE)
        )
    }

    fn validate_content(&self, content: &[u8]) -> Result<()> {
        require_non_empty(Ecosystem::Conan, content)
    }

    /// Search response listing each recipe reference once
    fn generate_index(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<u8>> {
        let mut results: Vec<String> = Vec::new();
        for d in descriptors.iter().filter(|d| !d.yanked) {
            let r = reference(d);
            if !results.contains(&r) {
                results.push(r);
            }
        }
        Ok(serde_json::to_vec_pretty(&SearchResults { results })?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_parse_and_round_trip() {
        let path = "zlib/1.3/_/_/conanfile.py";
        let d = ConanAdapter.parse_path(path).unwrap();
        assert_eq!(d.name, "zlib");
        assert_eq!(d.version, "1.3");
        assert_eq!(d.meta("file"), Some("conanfile.py"));
        assert_eq!(ConanAdapter.generate_path(&d), path);
    }

    #[test]
    fn test_user_channel_fallback() {
        let bare = ArtifactDescriptor::new(Ecosystem::Conan, "fmt", "10.1.0", "")
            .with_metadata("file", "conanmanifest.txt");
        assert_eq!(
            ConanAdapter.generate_path(&bare),
            "fmt/10.1.0/_/_/conanmanifest.txt"
        );
    }

    #[test]
    fn test_parse_rejects() {
        assert!(ConanAdapter.parse_path("zlib/1.3/conanfile.py").is_err());
        assert!(ConanAdapter.parse_path("zlib/1.3/_/_/export/conanfile.py").is_err());
    }

    #[test]
    fn test_search_results() {
        let a = ConanAdapter.parse_path("zlib/1.3/_/_/conanfile.py").unwrap();
        let b = ConanAdapter.parse_path("zlib/1.3/_/_/conanmanifest.txt").unwrap();
        let c = ConanAdapter
            .parse_path("boost/1.83.0/acme/stable/conanfile.py")
            .unwrap();
        let doc: Value =
            serde_json::from_slice(&ConanAdapter.generate_index(&[a, b, c]).unwrap()).unwrap();
        assert_eq!(
            doc,
            json!({ "results": ["zlib/1.3", "boost/1.83.0@acme/stable"] })
        );
    }
}
