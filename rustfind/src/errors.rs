//! Error types for the finder.
//!
//! Every failure is scoped to the smallest unit of work: a single directory
//! (one `SearchUnit`) or a single file (one `MatchCandidate`). Only
//! [`FindError::InvalidPattern`] and configuration errors abort a run, and they
//! do so before any worker starts.
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for finder operations
pub type FindResult<T> = Result<T, FindError>;

/// Errors that can occur while resolving, walking or matching
#[derive(Error, Debug)]
pub enum FindError {
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Unknown text encoding: {0}")]
    UnknownEncoding(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl FindError {
    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Maps an I/O error raised while touching `path`, splitting out
    /// permission failures so callers can log them at a lower level.
    pub fn io(path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }
}

impl From<config::ConfigError> for FindError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
