//! In-memory simulated storage service for testing.

use crate::StorageClient;
use crate::error::{ErrorKind, Result};
use crate::models::{DownloadMode, DownloadRecord, FileTrackingInfo};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use time::UtcDateTime;
use tokio::sync::RwLock;

const DEFAULT_DOWNLOAD_CHUNK: u64 = 1024;

struct TrackedFile {
    data: Vec<u8>,
    data_pieces: u64,
    parity_pieces: u64,
    /// Pieces stored so far, capped at `data_pieces + parity_pieces`.
    stored_pieces: u64,
}
impl TrackedFile {
    fn total_pieces(&self) -> u64 {
        self.data_pieces + self.parity_pieces
    }

    fn advance(&mut self) {
        self.stored_pieces = (self.stored_pieces + 1).min(self.total_pieces());
    }

    fn is_available(&self) -> bool {
        self.stored_pieces >= self.data_pieces
    }

    fn info(&self, path: &Path) -> FileTrackingInfo {
        FileTrackingInfo {
            path: path.to_path_buf(),
            size: self.data.len() as u64,
            upload_progress: self.stored_pieces as f64 / self.total_pieces() as f64,
            redundancy: self.stored_pieces as f64 / self.data_pieces as f64,
        }
    }

    fn range(&self, path: &Path, offset: u64, length: u64) -> Result<&[u8]> {
        let size = self.data.len() as u64;
        match offset.checked_add(length) {
            Some(end) if end <= size => Ok(&self.data[offset as usize..end as usize]),
            _ => exn::bail!(ErrorKind::InvalidRange {
                path: path.to_path_buf(),
                offset,
                length,
                size,
            }),
        }
    }
}

struct Transfer {
    record: DownloadRecord,
    /// Written to the destination once the transfer completes. Records inserted
    /// verbatim through [`MockService::insert_download`] carry no payload and
    /// never change.
    payload: Option<Vec<u8>>,
}

#[derive(Default)]
struct State {
    files: HashMap<PathBuf, TrackedFile>,
    transfers: Vec<Transfer>,
}

/// In-memory simulated storage service for testing.
///
/// Nothing happens in the background. Instead, every listing request stands
/// in for the passage of time:
///
/// - each call to [`tracked_files()`](StorageClient::tracked_files) stores one
///   more erasure-coded piece of every upload, so progress climbs in steps of
///   `1 / (data + parity)` and redundancy in steps of `1 / data`;
/// - each call to [`download_records()`](StorageClient::download_records)
///   moves every asynchronous download forward by one chunk, writing the
///   destination file once all bytes have arrived.
///
/// Files become downloadable once `data_pieces` pieces are stored.
///
/// # Examples
///
/// ```
/// use converge_client::StorageClient;
/// use converge_client::service::MockService;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let service = MockService::with_files([("works/123.bin", b"0123456789")]);
/// let files = service.tracked_files().await.unwrap();
/// assert_eq!(files[0].upload_progress, 1.0);
/// # Ok(())
/// # }
/// ```
pub struct MockService {
    name: String,
    download_chunk: u64,
    corrupt: AtomicBool,
    state: RwLock<State>,
}

impl MockService {
    /// Create a mock service already tracking fully uploaded files (one data
    /// piece, no parity).
    ///
    /// Panics if any path fails validation. If test setup is wrong, then test
    /// should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockService::with_files: invalid path {}", path.display());
            };
            let file = TrackedFile {
                data: data.into(),
                data_pieces: 1,
                parity_pieces: 0,
                stored_pieces: 1,
            };
            map.insert(validated, file);
        }
        Self {
            name: "mock".to_string(),
            download_chunk: DEFAULT_DOWNLOAD_CHUNK,
            corrupt: AtomicBool::new(false),
            state: RwLock::new(State { files: map, transfers: Vec::new() }),
        }
    }

    /// Change how many bytes an asynchronous download receives per listing.
    pub fn with_download_chunk(mut self, bytes: u64) -> Self {
        self.download_chunk = bytes.max(1);
        self
    }

    /// Flip the first byte of every payload handed out from now on.
    pub fn corrupt_downloads(&self, enabled: bool) {
        self.corrupt.store(enabled, Ordering::SeqCst);
    }

    /// Stop tracking a remote file. Returns `false` if it wasn't tracked.
    pub async fn forget(&self, remote: &Path) -> bool {
        let Ok(remote) = validate_path(remote) else {
            return false;
        };
        self.state.write().await.files.remove(&remote).is_some()
    }

    /// Drop every completed download record, as a service does when it reaps
    /// its download history. Returns the number of records dropped.
    pub async fn reap_downloads(&self) -> usize {
        let mut state = self.state.write().await;
        let before = state.transfers.len();
        state.transfers.retain(|t| !t.record.completed);
        before - state.transfers.len()
    }

    /// Report `record` verbatim (and forever) from
    /// [`download_records()`](StorageClient::download_records).
    pub async fn insert_download(&self, record: DownloadRecord) {
        self.state.write().await.transfers.push(Transfer { record, payload: None });
    }

    fn outgoing(&self, bytes: &[u8]) -> Vec<u8> {
        let mut bytes = bytes.to_vec();
        if self.corrupt.load(Ordering::SeqCst)
            && let Some(first) = bytes.first_mut()
        {
            *first ^= 0xff;
        }
        bytes
    }
}
impl Default for MockService {
    fn default() -> Self {
        let files: [(&str, &[u8]); 0] = [];
        Self::with_files(files)
    }
}

async fn write_destination(destination: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
    }
    tokio::fs::write(destination, data).await.map_err(ErrorKind::Io)?;
    Ok(())
}

#[async_trait]
impl StorageClient for MockService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn tracked_files(&self) -> Result<Vec<FileTrackingInfo>> {
        let mut state = self.state.write().await;
        Ok(state
            .files
            .iter_mut()
            .map(|(path, file)| {
                file.advance();
                file.info(path)
            })
            .collect())
    }

    async fn submit_upload(&self, source: &Path, remote: &Path, data_pieces: u64, parity_pieces: u64) -> Result<()> {
        let remote = validate_path(remote)?;
        if data_pieces == 0 {
            exn::bail!(ErrorKind::Rejected("at least one data piece is required".to_string()));
        }
        let data = tokio::fs::read(source).await.map_err(ErrorKind::Io)?;
        let mut state = self.state.write().await;
        if state.files.contains_key(&remote) {
            exn::bail!(ErrorKind::AlreadyExists(remote));
        }
        tracing::info!(service = %self.name, remote = %remote.display(), bytes = data.len(), data_pieces, parity_pieces, "Accepted upload");
        let file = TrackedFile {
            data,
            data_pieces,
            parity_pieces,
            stored_pieces: 0,
        };
        state.files.insert(remote, file);
        Ok(())
    }

    async fn submit_download(
        &self,
        remote: &Path,
        destination: &Path,
        offset: u64,
        length: u64,
        mode: DownloadMode,
    ) -> Result<()> {
        let remote = validate_path(remote)?;
        let (payload, file_size) = {
            let state = self.state.read().await;
            let file = state.files.get(&remote).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(remote.clone())))?;
            if !file.is_available() {
                exn::bail!(ErrorKind::Unavailable(remote));
            }
            (self.outgoing(file.range(&remote, offset, length)?), file.data.len() as u64)
        };
        let mut record = DownloadRecord {
            remote_path: remote,
            destination: destination.to_path_buf(),
            offset,
            length,
            file_size,
            received: 0,
            total_data_transferred: 0,
            completed: false,
            started: UtcDateTime::now(),
        };
        let transfer = match mode {
            DownloadMode::Blocking => {
                write_destination(destination, &payload).await?;
                record.received = length;
                record.total_data_transferred = length;
                record.completed = true;
                Transfer { record, payload: None }
            },
            DownloadMode::Async => Transfer { record, payload: Some(payload) },
        };
        self.state.write().await.transfers.push(transfer);
        Ok(())
    }

    async fn fetch_bytes(&self, remote: &Path, offset: u64, length: u64) -> Result<Vec<u8>> {
        let remote = validate_path(remote)?;
        let state = self.state.read().await;
        let file = state.files.get(&remote).ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(remote.clone())))?;
        if !file.is_available() {
            exn::bail!(ErrorKind::Unavailable(remote));
        }
        Ok(self.outgoing(file.range(&remote, offset, length)?))
    }

    async fn download_records(&self) -> Result<Vec<DownloadRecord>> {
        let mut state = self.state.write().await;
        for transfer in state.transfers.iter_mut() {
            let Some(payload) = &transfer.payload else {
                continue;
            };
            let record = &mut transfer.record;
            if record.completed {
                continue;
            }
            record.received = (record.received + self.download_chunk).min(record.length);
            record.total_data_transferred = record.received;
            if record.received == record.length {
                write_destination(&record.destination, payload).await?;
                record.completed = true;
            }
        }
        Ok(state.transfers.iter().map(|t| t.record.clone()).collect())
    }
}
