//! Service-reported snapshots.
//!
//! Every value here is a point-in-time observation returned by the storage
//! service. None of them are cached by the client; each request fetches a
//! fresh copy.

use std::path::PathBuf;
use time::UtcDateTime;

/// Tracking state of an uploaded file, as reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTrackingInfo {
    /// Remote path relative to the service root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Fraction of the upload that has completed. Nominally in `[0, 1]`, but
    /// services may overshoot while pieces are being replaced.
    pub upload_progress: f64,
    /// Stored pieces divided by the data pieces needed to reconstruct the file.
    pub redundancy: f64,
}

/// State of a single download, as reported by the service.
///
/// The service makes no promises about the consistency of these fields;
/// callers are expected to check them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRecord {
    /// Remote path being downloaded
    pub remote_path: PathBuf,
    /// Local destination the service writes to
    pub destination: PathBuf,
    /// Offset of the requested range
    pub offset: u64,
    /// Length of the requested range
    pub length: u64,
    /// Size of the remote file
    pub file_size: u64,
    /// Bytes of the requested range received so far
    pub received: u64,
    /// Total bytes transferred over the network, including overhead
    pub total_data_transferred: u64,
    /// Whether the service considers the download finished
    pub completed: bool,
    pub started: UtcDateTime,
}

/// Whether a download request returns before or after the data has arrived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DownloadMode {
    /// The request returns once the destination file has been written.
    #[default]
    Blocking,
    /// The request returns immediately; progress is reported through
    /// [`download_records()`](crate::StorageClient::download_records).
    Async,
}
