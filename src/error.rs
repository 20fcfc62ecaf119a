//! Error types for the mailsieve library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the mailsieve pipeline.
#[derive(Error, Debug)]
pub enum MailsieveError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// I/O error tied to a specific input artifact
    #[error("I/O error on {path}: {source}")]
    Artifact {
        /// The artifact that failed
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// Stored object not found in the content store
    #[error("No stored object for digest: {0}")]
    ObjectNotFound(String),

    /// Malformed message structure
    #[error("Message parse error: {0}")]
    Parse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

impl MailsieveError {
    /// Wrap an I/O error with the artifact path it occurred on.
    pub fn artifact(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Artifact {
            path: path.into(),
            source,
        }
    }
}

/// Convenience type alias for Result with MailsieveError
pub type Result<T> = std::result::Result<T, MailsieveError>;

impl From<anyhow::Error> for MailsieveError {
    fn from(err: anyhow::Error) -> Self {
        MailsieveError::Other(err.to_string())
    }
}
