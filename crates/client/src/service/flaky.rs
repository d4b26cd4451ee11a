//! Unreliable storage client decorator.
//!
//! Wraps another client and fails a fixed share of its read requests with a
//! network error, to exercise code that must tolerate transient transport
//! failures.

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ErrorKind, Result};
use crate::models::{DownloadMode, DownloadRecord, FileTrackingInfo};
use crate::{ClientHandle, StorageClient};

/// Storage client that drops every n-th read request.
///
/// Read requests ([`tracked_files`](StorageClient::tracked_files),
/// [`fetch_bytes`](StorageClient::fetch_bytes) and
/// [`download_records`](StorageClient::download_records)) share one counter;
/// the n-th, 2n-th, ... request fails with
/// [`Network`](crate::error::ErrorKind::Network) without reaching the inner
/// client. Submissions always pass through.
pub struct FlakyClient {
    inner: ClientHandle,
    every: u64,
    requests: AtomicU64,
}
impl FlakyClient {
    /// Fail every `every`-th read request. `0` and `1` both fail every request.
    pub fn new(inner: ClientHandle, every: u64) -> Self {
        Self {
            inner,
            every: every.max(1),
            requests: AtomicU64::new(0),
        }
    }

    fn gate(&self, request: &'static str) -> Result<()> {
        let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if count % self.every == 0 {
            tracing::debug!(service = self.inner.name(), request, count, "Dropping request");
            exn::bail!(ErrorKind::Network(format!("injected failure of {request} request #{count}")));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageClient for FlakyClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn tracked_files(&self) -> Result<Vec<FileTrackingInfo>> {
        self.gate("tracked_files")?;
        self.inner.tracked_files().await
    }

    async fn submit_upload(&self, source: &Path, remote: &Path, data_pieces: u64, parity_pieces: u64) -> Result<()> {
        self.inner.submit_upload(source, remote, data_pieces, parity_pieces).await
    }

    async fn submit_download(
        &self,
        remote: &Path,
        destination: &Path,
        offset: u64,
        length: u64,
        mode: DownloadMode,
    ) -> Result<()> {
        self.inner.submit_download(remote, destination, offset, length, mode).await
    }

    async fn fetch_bytes(&self, remote: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        self.gate("fetch_bytes")?;
        self.inner.fetch_bytes(remote, offset, length).await
    }

    async fn download_records(&self) -> Result<Vec<DownloadRecord>> {
        self.gate("download_records")?;
        self.inner.download_records().await
    }
}
