//! Error types for AgregLLM
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for AgregLLM operations
///
/// Covers configuration loading, local store access, capture normalization,
/// import/export documents, the remote backup store and folder edits.
#[derive(Error, Debug)]
pub enum AgregError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local store errors (backend access, blocking task failures)
    #[error("Storage error: {0}")]
    Storage(String),

    /// A compare-and-swap write kept losing against concurrent writers
    #[error("Write conflict on '{key}' after {attempts} attempts")]
    WriteConflict {
        /// Collection key that could not be written
        key: String,
        /// Number of read-modify-write attempts made
        attempts: usize,
    },

    /// Capture could not be turned into a conversation record
    #[error("Capture error: {0}")]
    Capture(String),

    /// Export document could not be imported
    #[error("Import error: {0}")]
    Import(String),

    /// Remote backup store errors (HTTP status, malformed responses)
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Remote store rejected the bearer token
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Folder reparenting would create a cycle or reference a missing folder
    #[error("Invalid folder move: {0}")]
    InvalidFolderMove(String),

    /// Record lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// SQLite errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for AgregLLM operations
///
/// Uses `anyhow::Error` so call sites can attach context while the
/// underlying [`AgregError`] stays downcastable.
pub type Result<T> = anyhow::Result<T>;
