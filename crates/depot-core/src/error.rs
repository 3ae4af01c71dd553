//! Core error types

use thiserror::Error;

use crate::ecosystem::Ecosystem;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid {ecosystem} path '{path}': {reason}")]
    InvalidPath {
        ecosystem: Ecosystem,
        path: String,
        reason: String,
    },

    #[error("Invalid {ecosystem} content: {reason}")]
    InvalidContent { ecosystem: Ecosystem, reason: String },

    #[error("Unsupported ecosystem: {tag}")]
    UnsupportedEcosystem { tag: String },

    #[error("Failed to render {ecosystem} index: {message}")]
    IndexRender { ecosystem: Ecosystem, message: String },

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn invalid_path(
        ecosystem: Ecosystem,
        path: &str,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvalidPath {
            ecosystem,
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_content(ecosystem: Ecosystem, reason: impl Into<String>) -> Self {
        CoreError::InvalidContent {
            ecosystem,
            reason: reason.into(),
        }
    }

    pub(crate) fn index_render(ecosystem: Ecosystem, message: impl ToString) -> Self {
        CoreError::IndexRender {
            ecosystem,
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
