//! Error types for repository operations

use depot_core::CoreError;
use thiserror::Error;

use crate::config::RepositoryKind;
use crate::persistence::PersistenceError;
use crate::store::StoreError;

/// A member repository's failure inside an aggregate operation
#[derive(Debug)]
pub struct MemberFailure {
    pub member: String,
    pub error: RepoError,
}

fn summarize(failures: &[MemberFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.member, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Request Errors ============
    #[error("Invalid path '{path}' in repository {repository}: {reason}")]
    InvalidPath {
        repository: String,
        path: String,
        reason: String,
    },

    #[error("Invalid content for '{path}' in repository {repository}: {reason}")]
    InvalidContent {
        repository: String,
        path: String,
        reason: String,
    },

    #[error("Artifact not found: {path} in repository {repository}")]
    NotFound { repository: String, path: String },

    #[error("{kind} repository {repository} does not support {operation}")]
    UnsupportedOperation {
        repository: String,
        kind: RepositoryKind,
        operation: &'static str,
    },

    #[error("Virtual repository {repository} has no local member to accept pushes")]
    NoLocalUpstream { repository: String },

    #[error("Upstream fetch of {url} for repository {repository} failed: {reason}")]
    UpstreamFetchFailed {
        repository: String,
        url: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("{operation} failed on {} member(s) of {repository}: {}", .failures.len(), summarize(.failures))]
    AggregateFailure {
        repository: String,
        operation: &'static str,
        failures: Vec<MemberFailure>,
    },

    #[error("All members of {repository} failed; last error: {last}")]
    AllUpstreamsFailed {
        repository: String,
        last: Box<RepoError>,
    },

    // ============ Registry Errors ============
    #[error("Unsupported ecosystem: {tag}")]
    UnsupportedEcosystem { tag: String },

    #[error("Repository already exists: {name}")]
    AlreadyExists { name: String },

    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Upstream repository not found: {name}")]
    UpstreamNotFound { name: String },

    #[error("Repository {name} still holds {count} artifact(s); delete with force to remove them")]
    RepositoryNotEmpty { name: String, count: usize },

    #[error("Invalid repository configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Collaborator Errors ============
    #[error("Content store {operation} of '{path}' failed in repository {repository}: {source}")]
    Store {
        repository: String,
        operation: &'static str,
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("Persistence {operation} failed for repository {repository}: {source}")]
    Persistence {
        repository: String,
        operation: &'static str,
        #[source]
        source: PersistenceError,
    },

    // ============ Request Lifecycle ============
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Status code a protocol front end should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            RepoError::NotFound { .. } | RepoError::RepositoryNotFound { .. } => 404,
            RepoError::InvalidPath { .. }
            | RepoError::InvalidContent { .. }
            | RepoError::NoLocalUpstream { .. } => 400,
            RepoError::UnsupportedOperation { .. } => 405,
            RepoError::UpstreamFetchFailed { status, .. } => match status {
                Some(404) => 404,
                _ => 502,
            },
            RepoError::AlreadyExists { .. } => 409,
            RepoError::AllUpstreamsFailed { last, .. } => last.status_code(),
            _ => 500,
        }
    }

    /// Whether this is an absent-artifact error, directly or as a virtual repository's last error
    pub fn is_not_found(&self) -> bool {
        match self {
            RepoError::NotFound { .. } => true,
            RepoError::UpstreamFetchFailed { status, .. } => *status == Some(404),
            RepoError::AllUpstreamsFailed { last, .. } => last.is_not_found(),
            _ => false,
        }
    }

    /// Attach repository context to an adapter error
    pub fn from_core(repository: &str, path: &str, error: CoreError) -> Self {
        match error {
            CoreError::InvalidPath { reason, .. } => RepoError::InvalidPath {
                repository: repository.to_string(),
                path: path.to_string(),
                reason,
            },
            CoreError::InvalidContent { reason, .. } => RepoError::InvalidContent {
                repository: repository.to_string(),
                path: path.to_string(),
                reason,
            },
            CoreError::UnsupportedEcosystem { tag } => RepoError::UnsupportedEcosystem { tag },
            CoreError::Io(e) => RepoError::Io(e),
            other => RepoError::Serialization(other.to_string()),
        }
    }

    pub(crate) fn store(
        repository: &str,
        operation: &'static str,
        path: &str,
        source: StoreError,
    ) -> Self {
        match source {
            StoreError::NotFound { .. } => RepoError::NotFound {
                repository: repository.to_string(),
                path: path.to_string(),
            },
            StoreError::InvalidPath { reason, .. } => RepoError::InvalidPath {
                repository: repository.to_string(),
                path: path.to_string(),
                reason,
            },
            source => RepoError::Store {
                repository: repository.to_string(),
                operation,
                path: path.to_string(),
                source,
            },
        }
    }

    pub(crate) fn persistence(
        repository: &str,
        operation: &'static str,
        source: PersistenceError,
    ) -> Self {
        RepoError::Persistence {
            repository: repository.to_string(),
            operation,
            source,
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidConfig {
            message: format!("invalid URL: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> RepoError {
        RepoError::NotFound {
            repository: "r".to_string(),
            path: "p".to_string(),
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(not_found().status_code(), 404);
        assert_eq!(
            RepoError::UnsupportedOperation {
                repository: "r".to_string(),
                kind: RepositoryKind::Remote,
                operation: "push",
            }
            .status_code(),
            405
        );
        assert_eq!(
            RepoError::NoLocalUpstream {
                repository: "v".to_string()
            }
            .status_code(),
            400
        );
        assert_eq!(
            RepoError::AlreadyExists {
                name: "r".to_string()
            }
            .status_code(),
            409
        );
        assert_eq!(RepoError::Cancelled.status_code(), 500);
    }

    #[test]
    fn test_upstream_status_mapping() {
        let upstream = |status| RepoError::UpstreamFetchFailed {
            repository: "r".to_string(),
            url: "http://u/p".to_string(),
            status,
            reason: "boom".to_string(),
        };
        assert_eq!(upstream(Some(404)).status_code(), 404);
        assert_eq!(upstream(Some(500)).status_code(), 502);
        assert_eq!(upstream(None).status_code(), 502);

        let wrapped = RepoError::AllUpstreamsFailed {
            repository: "v".to_string(),
            last: Box::new(upstream(Some(404))),
        };
        assert_eq!(wrapped.status_code(), 404);
        assert!(wrapped.is_not_found());
    }

    #[test]
    fn test_aggregate_message_lists_members() {
        let err = RepoError::AggregateFailure {
            repository: "v".to_string(),
            operation: "delete",
            failures: vec![
                MemberFailure {
                    member: "a".to_string(),
                    error: not_found(),
                },
                MemberFailure {
                    member: "b".to_string(),
                    error: RepoError::Cancelled,
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("2 member(s)"));
        assert!(msg.contains("a: Artifact not found"));
        assert!(msg.contains("b: Operation cancelled"));
    }

    #[test]
    fn test_from_core_keeps_context() {
        let core = depot_core::create_adapter("cargo")
            .unwrap()
            .parse_path("nope")
            .unwrap_err();
        let err = RepoError::from_core("crates", "nope", core);
        match err {
            RepoError::InvalidPath {
                repository, path, ..
            } => {
                assert_eq!(repository, "crates");
                assert_eq!(path, "nope");
            }
            other => panic!("unexpected {other:?}"),
        }

        let unsupported = RepoError::from_core(
            "x",
            "",
            CoreError::UnsupportedEcosystem {
                tag: "cocoapods".to_string(),
            },
        );
        assert!(matches!(unsupported, RepoError::UnsupportedEcosystem { .. }));
    }
}
