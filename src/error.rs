use std::fmt;

use thiserror::Error;

/// Library error type for snow-globe operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Decoding or reading a single image failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The cache or controller was used after `dispose()`.
    #[error("image cache has been disposed")]
    Disposed,

    /// The configured image directory is missing or not a directory.
    #[error("invalid image directory: {0}")]
    BadDir(String),
}

/// Failure recorded against one cache entry.
///
/// Cloneable so a failed entry can hand the same error to every caller that
/// asks about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadError {
    pub path: String,
    pub reason: String,
}

impl LoadError {
    pub fn new(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to load image {}: {}", self.path, self.reason)
    }
}

impl std::error::Error for LoadError {}
