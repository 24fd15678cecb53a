//! Error types for the core crate

use std::path::PathBuf;
use thiserror::Error;

/// Failures of graph operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Another update holds the graph.
    #[error("a graph update is already in progress")]
    UpdateInProgress,
    #[error("graph invariant violated: {0}")]
    Corrupt(String),
}

/// Failures loading or editing a workspace model.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to read workspace model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid workspace model: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("type `{key}` is declared in both project `{first}` and project `{second}`")]
    ConflictingProject {
        key: String,
        first: String,
        second: String,
    },
    #[error("document {0} is listed more than once")]
    DuplicateDocument(PathBuf),
}

/// Failures loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
