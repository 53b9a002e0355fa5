use std::path::PathBuf;

/// Errors that can occur across the strata miner.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette::Report` at the boundary.
///
/// # Examples
///
/// ```
/// use strata_core::StrataError;
///
/// let err = StrataError::Config("workers must be at least 1".into());
/// assert!(err.to_string().contains("workers must be at least 1"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StrataError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The version-control backend could not supply a commit, tree or diff.
    #[error("version control error: {0}")]
    Vcs(String),

    /// Malformed unified-diff text.
    #[error("parse error: {0}")]
    Parse(String),

    /// Persistence failure (open, query, insert or commit).
    #[error("database error: {0}")]
    Database(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
