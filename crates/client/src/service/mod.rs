//! Storage service client trait and implementations.
//!
//! This module defines the [`StorageClient`] trait, the contract a storage
//! service has to fulfil for the harness to observe it. Transport and wire
//! encoding are left to the implementations.

#[cfg(feature = "mock")]
mod flaky;
#[cfg(feature = "mock")]
mod mock;

#[cfg(feature = "mock")]
pub use self::flaky::FlakyClient;
#[cfg(feature = "mock")]
pub use self::mock::MockService;
use crate::error::Result;
use crate::models::{DownloadMode, DownloadRecord, FileTrackingInfo};
use async_trait::async_trait;
use std::path::Path;

/// Client for an asynchronous, eventually-consistent storage service.
///
/// Uploads and downloads are *submitted*; the service completes them in the
/// background and reports its progress through the listing methods. Every
/// method is a single request/response exchange with no partial results:
/// either the whole listing comes back, or an error does.
///
/// # Path Handling
/// Remote paths are relative to the service root and should be validated
/// using [`validate_path`](crate::validate_path). Local paths (upload sources
/// and download destinations) are used as given.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use converge_client::{StorageClient, error::Result};
///
/// async fn is_fully_uploaded(client: &dyn StorageClient, remote: &Path) -> Result<bool> {
///     let files = client.tracked_files().await?;
///     Ok(files.iter().any(|f| f.path.as_path() == remote && f.upload_progress >= 1.0))
/// }
/// ```
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Name of the service (used for logging only).
    fn name(&self) -> &str;

    /// List every file the service currently tracks.
    async fn tracked_files(&self) -> Result<Vec<FileTrackingInfo>>;

    /// Submit the local file at `source` for upload to `remote`, erasure coded
    /// into `data_pieces` data pieces and `parity_pieces` parity pieces.
    ///
    /// Returns once the service has accepted the upload; the upload itself
    /// progresses in the background.
    async fn submit_upload(&self, source: &Path, remote: &Path, data_pieces: u64, parity_pieces: u64) -> Result<()>;

    /// Submit a download of `length` bytes starting at `offset` of `remote`,
    /// written to the local `destination`.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the service
    /// does not track `remote`, and
    /// [`InvalidRange`](crate::error::ErrorKind::InvalidRange) if the range
    /// lies outside the file.
    async fn submit_download(
        &self,
        remote: &Path,
        destination: &Path,
        offset: u64,
        length: u64,
        mode: DownloadMode,
    ) -> Result<()>;

    /// Download `length` bytes starting at `offset` of `remote` directly into
    /// memory.
    async fn fetch_bytes(&self, remote: &Path, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// List every download the service currently reports, in submission order.
    ///
    /// # Notes
    /// - Services may reap finished downloads at any time, so a download that
    ///   was submitted earlier is not guaranteed to be listed.
    async fn download_records(&self) -> Result<Vec<DownloadRecord>>;
}
