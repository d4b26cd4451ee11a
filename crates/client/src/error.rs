//! Client Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage client error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The service does not know about the remote file.
    #[display("remote file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// A remote file is already registered under this path.
    #[display("remote file already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// The file is tracked but not enough pieces are stored to reconstruct it.
    #[display("remote file not yet available: {}", _0.display())]
    Unavailable(#[error(not(source))] PathBuf),
    /// Requested byte range lies outside the file.
    #[display("invalid range {offset}+{length} for {} ({size} bytes)", path.display())]
    InvalidRange { path: PathBuf, offset: u64, length: u64, size: u64 },
    /// Path contains invalid characters or escapes the service root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The service refused the request parameters.
    #[display("request rejected: {_0}")]
    Rejected(#[error(not(source))] String),
    /// Underlying I/O error on a local source or destination file
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Network-related error (connection refused, timeouts, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Unavailable(_))
    }
}
