//! Integration tests for CLI commands

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to run depot command
fn depot(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_depot"))
        .args(args)
        .env_remove("DEPOT_CONFIG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute depot")
}

/// Run with a config file inside `dir` that keeps all state in `dir`
fn depot_in(dir: &Path, args: &[&str]) -> Output {
    let config = dir.join("depot.yaml");
    if !config.exists() {
        std::fs::write(
            &config,
            format!(
                "storageRoot: {}\ndatabase: {}\n",
                dir.join("objects").display(),
                dir.join("depot.db").display()
            ),
        )
        .unwrap();
    }

    let mut full = vec!["--config", config.to_str().unwrap()];
    full.extend_from_slice(args);
    depot(&full)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

mod adapter_commands {
    use super::*;

    #[test]
    fn test_parse_scoped_npm_json() {
        let output = depot(&["parse", "npm", "@angular/core/-/core-14.2.0.tgz", "--json"]);
        assert!(output.status.success());

        let json: serde_json::Value =
            serde_json::from_str(&stdout(&output)).expect("Output should be valid JSON");
        assert_eq!(json["name"], "@angular/core");
        assert_eq!(json["version"], "14.2.0");
        assert_eq!(json["ecosystem"], "npm");
    }

    #[test]
    fn test_parse_rejects_unknown_ecosystem() {
        let output = depot(&["parse", "cocoapods", "a/b"]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_index_path_and_normalize() {
        let output = depot(&["index-path", "serde_json"]);
        assert_eq!(stdout(&output).trim(), "se/rd/serde_json");

        let output = depot(&["normalize", "My_Pkg.Name"]);
        assert_eq!(stdout(&output).trim(), "my-pkg-name");
    }

    #[test]
    fn test_ecosystems() {
        let output = depot(&["ecosystems"]);
        let tags = stdout(&output);
        assert_eq!(tags.lines().count(), 13);
        assert!(tags.lines().any(|t| t == "maven"));
    }
}

mod repository_commands {
    use super::*;

    const PATH: &str = "tool/1.0/tool.bin";

    #[test]
    fn test_local_round_trip() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("tool.bin");
        std::fs::write(&artifact, b"binary-content").unwrap();

        let output = depot_in(dir.path(), &["repo", "add", "tools", "--ecosystem", "generic"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let output = depot_in(
            dir.path(),
            &["push", "tools", PATH, artifact.to_str().unwrap()],
        );
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(stdout(&output).contains("Pushed"));

        let output = depot_in(dir.path(), &["pull", "tools", PATH]);
        assert!(output.status.success());
        assert_eq!(output.stdout, b"binary-content");

        let output = depot_in(dir.path(), &["list", "tools"]);
        assert_eq!(stdout(&output).trim(), PATH);

        let output = depot_in(dir.path(), &["stats", "tools", "--json"]);
        let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
        assert_eq!(json["totalArtifacts"], 1);
        assert_eq!(json["pushCount"], 1);
        assert_eq!(json["pullCount"], 1);

        let output = depot_in(dir.path(), &["pull", "tools", "tool/2.0/tool.bin"]);
        assert_eq!(output.status.code(), Some(3));
    }

    #[test]
    fn test_remove_requires_force() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("tool.bin");
        std::fs::write(&artifact, b"x").unwrap();

        depot_in(dir.path(), &["repo", "add", "tools", "--ecosystem", "generic"]);
        depot_in(
            dir.path(),
            &["push", "tools", PATH, artifact.to_str().unwrap()],
        );

        let output = depot_in(dir.path(), &["repo", "remove", "tools"]);
        assert_eq!(output.status.code(), Some(2));

        let output = depot_in(dir.path(), &["repo", "remove", "tools", "--force"]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let output = depot_in(dir.path(), &["repo", "list"]);
        assert!(stdout(&output).contains("No repositories configured"));
    }

    #[test]
    fn test_virtual_requires_existing_members() {
        let dir = TempDir::new().unwrap();
        let output = depot_in(
            dir.path(),
            &[
                "repo", "add", "all", "--kind", "virtual", "--ecosystem", "npm", "--upstream",
                "missing",
            ],
        );
        assert_eq!(output.status.code(), Some(2));

        let config = std::fs::read_to_string(dir.path().join("depot.yaml")).unwrap();
        assert!(!config.contains("name: all"));
    }

    #[test]
    fn test_virtual_push_routes_to_local() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("tool.bin");
        std::fs::write(&artifact, b"routed").unwrap();

        depot_in(dir.path(), &["repo", "add", "tools", "--ecosystem", "generic"]);
        let output = depot_in(
            dir.path(),
            &[
                "repo", "add", "all", "--kind", "virtual", "--ecosystem", "generic", "--upstream",
                "tools",
            ],
        );
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        depot_in(dir.path(), &["push", "all", PATH, artifact.to_str().unwrap()]);
        let output = depot_in(dir.path(), &["pull", "tools", PATH]);
        assert_eq!(output.stdout, b"routed");

        let output = depot_in(dir.path(), &["repo", "remove", "tools", "--force"]);
        assert_eq!(output.status.code(), Some(2));
    }
}
