//! Harness Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors raised by the storage client
//! are kept as children of a [`Transport`](ErrorKind::Transport) frame.

use crate::download::Violations;
use crate::file::{Checksum, LocalFile, RemoteFile};
use derive_more::{Display, Error};
use std::path::PathBuf;

/// A harness error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Service Errors
/// - [`ErrorKind::Transport`]
/// - [`ErrorKind::Untracked`]
/// - [`ErrorKind::Consistency`] - non-fatal, also available on the record
///   itself through [`DownloadInfo`](crate::DownloadInfo).
///
/// ### Convergence Errors
/// - [`ErrorKind::ThresholdNotMet`] - carries the last observed value.
///
/// ### Integrity Errors
/// - [`ErrorKind::Integrity`]
/// - [`ErrorKind::Unreadable`]
/// - [`ErrorKind::CorruptDownload`] - wraps one of the above, carrying the
///   downloaded file's identity.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A request to the storage service failed.
    #[display("storage service request failed")]
    Transport,
    /// The service doesn't track the file at all. Carries the identity so the
    /// caller can keep inspecting it.
    #[display("file is not tracked by the service: {}", _0.path().display())]
    Untracked(#[error(not(source))] RemoteFile),
    /// A download record broke one or more of its invariants.
    #[display("inconsistent download record: {_0}")]
    Consistency(#[error(not(source))] Violations),
    /// The awaited condition did not hold when last observed.
    #[display("{_0}")]
    ThresholdNotMet(#[error(not(source))] Shortfall),
    /// Content does not hash to the expected checksum.
    #[display("checksum mismatch for {}: expected {expected}, found {actual}", subject.display())]
    Integrity {
        subject: PathBuf,
        expected: Checksum,
        actual: Checksum,
    },
    /// A local file couldn't be read for verification.
    #[display("cannot read {} for verification", _0.display())]
    Unreadable(#[error(not(source))] PathBuf),
    /// A file downloaded to disk failed verification.
    #[display("downloaded file failed verification: {}", _0.path().display())]
    CorruptDownload(#[error(not(source))] LocalFile),
    /// Creating or writing a local file failed.
    #[display("local file I/O failed: {}", _0.display())]
    LocalIo(#[error(not(source))] PathBuf),
    /// A local file name can't be used as a remote path.
    #[display("invalid remote path: {}", _0.display())]
    InvalidRemotePath(#[error(not(source))] PathBuf),
    /// Erasure coding parameters can't describe a file.
    #[display("invalid erasure coding: {data_pieces} data pieces, {parity_pieces} parity pieces")]
    ErasureCoding { data_pieces: u64, parity_pieces: u64 },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::ThresholdNotMet(_))
    }
}

/// How far an awaited condition was from holding.
#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum Shortfall {
    #[display("upload progress should be {target} but was {observed}")]
    Progress { target: f64, observed: f64 },
    #[display("redundancy should be {target} but was {observed}")]
    Redundancy { target: f64, observed: f64 },
    #[display("download hasn't finished yet ({received} of {length} bytes received)")]
    Download { received: u64, length: u64 },
    #[display("no download record observed")]
    DownloadNotObserved,
}
