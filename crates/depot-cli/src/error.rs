//! CLI error types with exit code handling
//!
//! Engine errors are mapped onto a small set of variants by the status code
//! a protocol front end would answer with.

use depot_core::CoreError;
use depot_repo::RepoError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid user input or a request the repository rejects
    #[error("{message}")]
    #[diagnostic(code(depot::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Unknown repository or artifact
    #[error("{message}")]
    #[diagnostic(code(depot::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Upstream fetch failed
    #[error("{message}")]
    #[diagnostic(code(depot::cli::upstream))]
    Upstream { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(depot::cli::io))]
    Io { message: String },

    /// Internal error (storage, database, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(depot::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::Upstream { .. } => exit_codes::UPSTREAM_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an input error (user provided invalid input)
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();
        match &err {
            RepoError::RepositoryNotFound { .. } => CliError::NotFound {
                message,
                help: Some("Run 'depot repo list' to see configured repositories".to_string()),
            },
            RepoError::UpstreamNotFound { name } => CliError::Input {
                help: Some(format!("Add '{}' before the virtual repository that uses it", name)),
                message,
            },
            RepoError::RepositoryNotEmpty { .. } => CliError::Input {
                message,
                help: Some("Pass --force to delete its artifacts as well".to_string()),
            },
            RepoError::Io(_) => CliError::Io { message },
            RepoError::InvalidConfig { .. } | RepoError::UnsupportedEcosystem { .. } => {
                CliError::input(message)
            }
            _ => match err.status_code() {
                404 => CliError::NotFound {
                    message,
                    help: None,
                },
                400 | 405 | 409 => CliError::input(message),
                502 => CliError::Upstream { message },
                _ => CliError::internal(message),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => CliError::from(e),
            CoreError::UnsupportedEcosystem { .. } => CliError::input_with_help(
                err.to_string(),
                "Run 'depot ecosystems' to list supported tags",
            ),
            other => CliError::input(other.to_string()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::internal(err.to_string())
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
