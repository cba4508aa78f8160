//! Error types for gitcache

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for gitcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gitcache operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// `git clone --bare` exited unsuccessfully
    #[error("Clone of {url} failed: {stderr}")]
    CloneFailed { url: String, stderr: String },

    /// `git fetch` exited unsuccessfully
    #[error("Fetch into {} failed: {stderr}", path.display())]
    FetchFailed { path: PathBuf, stderr: String },

    /// An external operation did not finish in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Git process or repository inspection error
    #[error("Git error: {0}")]
    Git(String),
}
