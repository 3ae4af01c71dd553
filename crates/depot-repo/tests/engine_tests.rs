//! End-to-end tests of the repository engine over real collaborators

use chrono::{DateTime, Utc};
use depot_core::Ecosystem;
use depot_repo::{
    Collaborators, FileContentStore, HttpUpstream, ManualClock, MemoryContentStore,
    MemoryPersistence, Persistence, RepoError, Repository, RepositoryKind, RepositoryRegistry,
    RepositorySpec, RequestContext, SqlitePersistence,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn upstream() -> Arc<HttpUpstream> {
    Arc::new(HttpUpstream::public(Duration::from_secs(5)).unwrap())
}

/// File store and SQLite database under a temporary directory
fn on_disk(dir: &TempDir) -> (Collaborators, Arc<SqlitePersistence>) {
    let store = FileContentStore::new(dir.path().join("objects")).unwrap();
    let db = Arc::new(SqlitePersistence::open_at(&dir.path().join("depot.db")).unwrap());
    let collaborators = Collaborators::new(Arc::new(store), db.clone(), upstream())
        .with_clock(Arc::new(ManualClock::new(start())));
    (collaborators, db)
}

fn in_memory(clock: Arc<ManualClock>) -> (Collaborators, MemoryPersistence) {
    let db = MemoryPersistence::new();
    let collaborators = Collaborators::new(
        Arc::new(MemoryContentStore::new()),
        Arc::new(db.clone()),
        upstream(),
    )
    .with_clock(clock);
    (collaborators, db)
}

mod local_repository {
    use super::*;

    const TARBALL: &str = "left-pad/-/left-pad-1.3.0.tgz";

    fn npm_tarball() -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::GzEncoder;

        let manifest = br#"{"name":"left-pad","version":"1.3.0","description":"pad","license":"MIT"}"#;
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        header.set_size(manifest.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "package/package.json", &manifest[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[tokio::test]
    async fn test_round_trip_updates_statistics() {
        let dir = TempDir::new().unwrap();
        let (collaborators, _db) = on_disk(&dir);
        let registry = RepositoryRegistry::new(collaborators);
        let ctx = RequestContext::background();

        let libs = registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Npm))
            .await
            .unwrap();
        let before = libs.get_statistics(&ctx).await.unwrap();

        let content = npm_tarball();
        let descriptor = libs.push(&ctx, TARBALL, &content, None).await.unwrap();
        assert_eq!(descriptor.name, "left-pad");
        assert_eq!(descriptor.version, "1.3.0");
        assert_eq!(descriptor.size, content.len() as u64);
        assert_eq!(descriptor.meta("license"), Some("MIT"));

        assert_eq!(libs.pull(&ctx, TARBALL).await.unwrap(), content);

        let after = libs.get_statistics(&ctx).await.unwrap();
        assert_eq!(after.total_artifacts, before.total_artifacts + 1);
        assert_eq!(after.push_count, before.push_count + 1);
        assert_eq!(after.pull_count, before.pull_count + 1);

        assert_eq!(libs.list(&ctx, "left-pad/").await.unwrap(), vec![TARBALL]);
        let index = String::from_utf8(libs.get_index(&ctx).await.unwrap()).unwrap();
        assert!(index.contains("\"1.3.0\""));
        assert_eq!(libs.index_content_type(), "application/json");

        libs.delete(&ctx, TARBALL).await.unwrap();
        assert!(libs.pull(&ctx, TARBALL).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rebuild_recovers_lost_records() {
        let dir = TempDir::new().unwrap();
        let (collaborators, db) = on_disk(&dir);
        let registry = RepositoryRegistry::new(collaborators);
        let ctx = RequestContext::background();

        let libs = registry
            .create(&ctx, RepositorySpec::local("libs", Ecosystem::Npm))
            .await
            .unwrap();
        libs.push(&ctx, TARBALL, &npm_tarball(), None).await.unwrap();
        assert!(db.delete_artifact("libs", TARBALL).await.unwrap());
        assert!(libs.descriptors(&ctx).await.unwrap().is_empty());

        let report = libs.rebuild_index(&ctx).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.indexed, 1);
        let restored = libs.descriptors(&ctx).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].meta("license"), Some("MIT"));
    }
}

mod remote_repository {
    use super::*;

    const PATH: &str = "tool/1.0/tool.bin";

    async fn fetches(server: &MockServer) -> usize {
        server.received_requests().await.unwrap_or_default().len()
    }

    #[tokio::test]
    async fn test_cache_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/generic/tool/1.0/tool.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"binary".to_vec()))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(start()));
        let (collaborators, db) = in_memory(clock.clone());
        let registry = RepositoryRegistry::new(collaborators);
        let ctx = RequestContext::background();
        let proxy = registry
            .create(
                &ctx,
                RepositorySpec::remote("proxy", Ecosystem::Generic, format!("{}/generic/", server.uri()))
                    .with_cache_ttl(Duration::from_secs(600)),
            )
            .await
            .unwrap();

        // Miss
        assert_eq!(proxy.pull(&ctx, PATH).await.unwrap(), b"binary");
        assert_eq!(fetches(&server).await, 1);
        let first = db.get_cache_entry("proxy", PATH).await.unwrap().unwrap();
        assert_eq!(first.expires_at - first.fetched_at, chrono::Duration::seconds(600));

        // Hit
        clock.advance(Duration::from_secs(599));
        assert_eq!(proxy.pull(&ctx, PATH).await.unwrap(), b"binary");
        assert_eq!(fetches(&server).await, 1);

        // Expired
        clock.advance(Duration::from_secs(1));
        assert_eq!(proxy.pull(&ctx, PATH).await.unwrap(), b"binary");
        assert_eq!(fetches(&server).await, 2);
        let second = db.get_cache_entry("proxy", PATH).await.unwrap().unwrap();
        assert!(second.fetched_at > first.fetched_at);
        assert_eq!(db.list_cache_entries("proxy").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_default_ttl_is_one_day() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tool/1.0/tool.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"binary".to_vec()))
            .mount(&server)
            .await;

        let clock = Arc::new(ManualClock::new(start()));
        let (collaborators, db) = in_memory(clock.clone());
        let registry = RepositoryRegistry::new(collaborators);
        let ctx = RequestContext::background();
        let proxy = registry
            .create(
                &ctx,
                RepositorySpec::remote("proxy", Ecosystem::Generic, server.uri()),
            )
            .await
            .unwrap();

        proxy.pull(&ctx, PATH).await.unwrap();
        let entry = db.get_cache_entry("proxy", PATH).await.unwrap().unwrap();
        assert_eq!(entry.fetched_at, start());
        assert_eq!(entry.expires_at - entry.fetched_at, chrono::Duration::hours(24));

        clock.advance(Duration::from_secs(24 * 3600 - 1));
        proxy.pull(&ctx, PATH).await.unwrap();
        assert_eq!(fetches(&server).await, 1);

        clock.advance(Duration::from_secs(1));
        proxy.pull(&ctx, PATH).await.unwrap();
        assert_eq!(fetches(&server).await, 2);
    }

    #[tokio::test]
    async fn test_upstream_not_found() {
        let server = MockServer::start().await;
        let (collaborators, _db) = in_memory(Arc::new(ManualClock::new(start())));
        let registry = RepositoryRegistry::new(collaborators);
        let ctx = RequestContext::background();
        let proxy = registry
            .create(
                &ctx,
                RepositorySpec::remote("proxy", Ecosystem::Generic, server.uri()),
            )
            .await
            .unwrap();

        let err = proxy.pull(&ctx, PATH).await.unwrap_err();
        assert!(matches!(
            err,
            RepoError::UpstreamFetchFailed {
                status: Some(404),
                ..
            }
        ));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let (collaborators, _db) = in_memory(Arc::new(ManualClock::new(start())));
        let registry = RepositoryRegistry::new(collaborators);
        let ctx = RequestContext::background();
        let proxy = registry
            .create(
                &ctx,
                RepositorySpec::remote("proxy", Ecosystem::Generic, "https://mirror.example.com"),
            )
            .await
            .unwrap();

        for err in [
            proxy.push(&ctx, PATH, b"x", None).await.unwrap_err(),
            proxy.delete(&ctx, PATH).await.unwrap_err(),
        ] {
            assert!(matches!(
                err,
                RepoError::UnsupportedOperation {
                    kind: RepositoryKind::Remote,
                    ..
                }
            ));
            assert_eq!(err.status_code(), 405);
        }
        assert_eq!(proxy.rebuild_index(&ctx).await.unwrap(), Default::default());
    }
}

mod virtual_repository {
    use super::*;

    const V1: &str = "com/acme/app/1.0/app-1.0.jar";

    async fn setup(server: &MockServer) -> (RepositoryRegistry, RequestContext) {
        let (collaborators, _db) = in_memory(Arc::new(ManualClock::new(start())));
        let registry = RepositoryRegistry::new(collaborators);
        let ctx = RequestContext::background();
        for spec in [
            RepositorySpec::local("releases", Ecosystem::Maven),
            RepositorySpec::local("snapshots", Ecosystem::Maven),
            RepositorySpec::remote("central", Ecosystem::Maven, server.uri()),
            RepositorySpec::virtual_(
                "public",
                Ecosystem::Maven,
                ["central", "releases", "snapshots"],
            ),
        ] {
            registry.create(&ctx, spec).await.unwrap();
        }
        (registry, ctx)
    }

    #[tokio::test]
    async fn test_pull_precedence() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{V1}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"from-central".to_vec()))
            .mount(&server)
            .await;
        let (registry, ctx) = setup(&server).await;

        registry
            .get("releases")
            .unwrap()
            .push(&ctx, V1, b"from-releases", None)
            .await
            .unwrap();

        let public = registry.get("public").unwrap();
        assert_eq!(public.pull(&ctx, V1).await.unwrap(), b"from-central");
    }

    #[tokio::test]
    async fn test_last_error_is_reported() {
        let server = MockServer::start().await;
        let (registry, ctx) = setup(&server).await;

        let err = registry
            .get("public")
            .unwrap()
            .pull(&ctx, V1)
            .await
            .unwrap_err();
        match err {
            RepoError::AllUpstreamsFailed { last, .. } => {
                // `snapshots` is the last member
                assert!(matches!(*last, RepoError::NotFound { ref repository, .. } if repository == "snapshots"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_push_routing() {
        let server = MockServer::start().await;
        let (registry, ctx) = setup(&server).await;

        let public = registry.get("public").unwrap();
        let d = public.push(&ctx, V1, b"jar", None).await.unwrap();
        assert_eq!(d.repository, "releases");
        assert!(registry.get("snapshots").unwrap().pull(&ctx, V1).await.is_err());

        registry
            .create(
                &ctx,
                RepositorySpec::virtual_("mirror", Ecosystem::Maven, ["central"]),
            )
            .await
            .unwrap();
        let err = registry
            .get("mirror")
            .unwrap()
            .push(&ctx, V1, b"jar", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NoLocalUpstream { .. }));
    }

    #[tokio::test]
    async fn test_delete_aggregation() {
        let server = MockServer::start().await;
        let (registry, ctx) = setup(&server).await;

        for member in ["releases", "snapshots"] {
            registry
                .get(member)
                .unwrap()
                .push(&ctx, V1, b"jar", None)
                .await
                .unwrap();
        }

        let public = registry.get("public").unwrap();
        public.delete(&ctx, V1).await.unwrap();
        for member in ["releases", "snapshots"] {
            assert!(registry.get(member).unwrap().pull(&ctx, V1).await.is_err());
        }
        match public.delete(&ctx, V1).await.unwrap_err() {
            RepoError::AggregateFailure { failures, .. } => {
                let members: Vec<_> = failures.iter().map(|f| f.member.as_str()).collect();
                assert_eq!(members, vec!["releases", "snapshots"]);
                assert!(failures.iter().all(|f| f.error.is_not_found()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_reaches_members_after_a_failure() {
        let server = MockServer::start().await;
        let (registry, ctx) = setup(&server).await;

        // Only the second local member holds the artifact
        registry
            .get("snapshots")
            .unwrap()
            .push(&ctx, V1, b"jar", None)
            .await
            .unwrap();

        let err = registry.get("public").unwrap().delete(&ctx, V1).await.unwrap_err();
        match err {
            RepoError::AggregateFailure { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].member, "releases");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(registry.get("snapshots").unwrap().pull(&ctx, V1).await.is_err());
    }
}

mod registry {
    use super::*;

    #[tokio::test]
    async fn test_restore_after_restart() {
        let dir = TempDir::new().unwrap();
        let ctx = RequestContext::background();
        {
            let (collaborators, _db) = on_disk(&dir);
            let registry = RepositoryRegistry::new(collaborators);
            registry
                .create(&ctx, RepositorySpec::local("crates", Ecosystem::Cargo))
                .await
                .unwrap();
            registry
                .create(
                    &ctx,
                    RepositorySpec::remote("crates-io", Ecosystem::Cargo, "https://index.crates.io"),
                )
                .await
                .unwrap();
            registry
                .create(
                    &ctx,
                    RepositorySpec::virtual_("cargo", Ecosystem::Cargo, ["crates", "crates-io"]),
                )
                .await
                .unwrap();
        }

        let (collaborators, _db) = on_disk(&dir);
        let registry = RepositoryRegistry::new(collaborators);
        assert_eq!(registry.restore(&ctx).await.unwrap(), 3);
        assert_eq!(registry.names(), vec!["cargo", "crates", "crates-io"]);
        assert_eq!(registry.get("cargo").unwrap().kind(), RepositoryKind::Virtual);

        registry.delete(&ctx, "cargo", false).await.unwrap();
        let (collaborators, db) = on_disk(&dir);
        assert_eq!(db.list_repositories().await.unwrap().len(), 2);
        assert_eq!(
            RepositoryRegistry::new(collaborators)
                .restore(&ctx)
                .await
                .unwrap(),
            2
        );
    }
}
