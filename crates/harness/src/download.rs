//! Download monitoring.
//!
//! Downloads are correlated with the records the service reports by the pair
//! of remote path and local destination, so several downloads of the same
//! remote file can be told apart. Records are never trusted: every record
//! found is checked against its invariants, and a finished download is only
//! accepted once the bytes on disk hash to the expected checksum.

use crate::error::{ErrorKind, Result, Shortfall};
use crate::file::{Checksum, LocalFile, RemoteFile};
use crate::node::Node;
use converge_client::{DownloadMode, DownloadRecord};
use derive_more::Display;
use exn::ResultExt;
use std::fmt;
use tracing::instrument;

/// A broken invariant of a [`DownloadRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Violation {
    #[display("filesize != length ({file_size} != {length})")]
    LengthMismatch { length: u64, file_size: u64 },
    #[display("received > transferred ({received} > {transferred})")]
    ReceivedExceedsTransferred { received: u64, transferred: u64 },
    #[display("completed == true but received != length ({received} != {length})")]
    IncompleteCompletion { received: u64, length: u64 },
}

/// Every invariant a single record breaks, in a fixed order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);
impl Violations {
    pub fn of(record: &DownloadRecord) -> Self {
        let mut found = Vec::new();
        if record.length != record.file_size {
            found.push(Violation::LengthMismatch {
                length: record.length,
                file_size: record.file_size,
            });
        }
        if record.received > record.total_data_transferred {
            found.push(Violation::ReceivedExceedsTransferred {
                received: record.received,
                transferred: record.total_data_transferred,
            });
        }
        if record.completed && record.received != record.length {
            found.push(Violation::IncompleteCompletion {
                received: record.received,
                length: record.length,
            });
        }
        Self(found)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.0.iter()
    }

    pub fn contains(&self, violation: &Violation) -> bool {
        self.0.contains(violation)
    }
}
impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, violation) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// A matching download record and the invariants it breaks.
///
/// Broken invariants don't stop the record from being returned; call
/// [`check`](Self::check) to turn them into an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadInfo {
    pub record: DownloadRecord,
    pub violations: Violations,
}
impl DownloadInfo {
    pub fn new(record: DownloadRecord) -> Self {
        let violations = Violations::of(&record);
        Self { record, violations }
    }

    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    /// Fail with [`Consistency`](ErrorKind::Consistency) if the record breaks
    /// any invariant.
    #[track_caller]
    pub fn check(&self) -> Result<()> {
        if !self.is_consistent() {
            exn::bail!(ErrorKind::Consistency(self.violations.clone()));
        }
        Ok(())
    }
}

/// How a wait for a download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The service reported the download as completed.
    Completed,
    /// The service never reported the download. It either finished and was
    /// reaped before it was observed, or it never started.
    NotObserved,
}

impl Node {
    /// Download all of `remote` to a fresh file in the scratch directory.
    ///
    /// A [blocking](DownloadMode::Blocking) download is verified before
    /// returning; if verification fails the error is
    /// [`CorruptDownload`](ErrorKind::CorruptDownload), carrying the local
    /// identity. An [asynchronous](DownloadMode::Async) download returns as
    /// soon as the service accepted it; pass the returned file to
    /// [`wait_for_download`](Self::wait_for_download).
    #[instrument(skip_all, fields(remote = %remote.path().display(), mode = ?mode))]
    pub async fn download_to_disk(&self, remote: &RemoteFile, mode: DownloadMode) -> Result<LocalFile> {
        let info = self.file_info(remote).await?;
        let destination = self.scratch_path().await?;
        self.client
            .submit_download(remote.path(), &destination, 0, info.size, mode)
            .await
            .or_raise(|| ErrorKind::Transport)?;
        tracing::info!(
            service = self.client.name(),
            destination = %destination.display(),
            bytes = info.size,
            "Submitted download"
        );
        let local = LocalFile::new(destination, remote.checksum());
        if mode == DownloadMode::Async {
            return Ok(local);
        }
        local.check_integrity().await.or_raise(|| ErrorKind::CorruptDownload(local.clone()))?;
        Ok(local)
    }

    /// Download all of `remote` into memory, verified against its checksum.
    ///
    /// Content that doesn't match is an [`Integrity`](ErrorKind::Integrity)
    /// error naming the remote path, never a transport error.
    #[instrument(skip_all, fields(remote = %remote.path().display()))]
    pub async fn download_by_stream(&self, remote: &RemoteFile) -> Result<Vec<u8>> {
        let info = self.file_info(remote).await?;
        let data = self
            .client
            .fetch_bytes(remote.path(), 0, info.size)
            .await
            .or_raise(|| ErrorKind::Transport)?;
        let actual = Checksum::of(&data);
        if actual != remote.checksum() {
            exn::bail!(ErrorKind::Integrity {
                subject: remote.path().to_path_buf(),
                expected: remote.checksum(),
                actual,
            });
        }
        Ok(data)
    }

    /// The first download record of `remote` into `local`, if the service
    /// reports one.
    ///
    /// No matching record is `Ok(None)`, not an error.
    pub async fn download_info(&self, local: &LocalFile, remote: &RemoteFile) -> Result<Option<DownloadInfo>> {
        let records = self.client.download_records().await.or_raise(|| ErrorKind::Transport)?;
        let info = records
            .into_iter()
            .find(|record| record.remote_path.as_path() == remote.path() && record.destination.as_path() == local.path())
            .map(DownloadInfo::new);
        if let Some(info) = &info
            && !info.is_consistent()
        {
            tracing::debug!(violations = %info.violations, "Inconsistent download record");
        }
        Ok(info)
    }

    /// Poll until the download of `remote` into `local` has completed, then
    /// verify the file on disk.
    ///
    /// A download the service doesn't report is treated as finished unless
    /// observed completion is required by the configuration, in which case
    /// polling continues until the record shows up as completed. Either way
    /// the integrity check has the final say.
    #[instrument(skip_all, fields(local = %local.path().display(), remote = %remote.path().display()))]
    pub async fn wait_for_download(&self, local: &LocalFile, remote: &RemoteFile) -> Result<DownloadOutcome> {
        let outcome = self.poll.retry(move || self.poll_download(local, remote)).await?;
        if outcome == DownloadOutcome::NotObserved {
            tracing::warn!("Download was never reported by the service; verifying the local file anyway");
        }
        local.check_integrity().await.or_raise(|| ErrorKind::CorruptDownload(local.clone()))?;
        Ok(outcome)
    }

    async fn poll_download(&self, local: &LocalFile, remote: &RemoteFile) -> Result<DownloadOutcome> {
        let Some(info) = self.download_info(local, remote).await? else {
            if self.require_observed_completion {
                exn::bail!(ErrorKind::ThresholdNotMet(Shortfall::DownloadNotObserved));
            }
            return Ok(DownloadOutcome::NotObserved);
        };
        info.check()?;
        if !info.record.completed {
            exn::bail!(ErrorKind::ThresholdNotMet(Shortfall::Download {
                received: info.record.received,
                length: info.record.length,
            }));
        }
        Ok(DownloadOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use converge_client::{ClientHandle, StorageClient};
    use converge_client::service::{FlakyClient, MockService};
    use converge_config::Config;
    use rstest::rstest;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;
    use time::UtcDateTime;

    const CONTENT: &[u8] = b"The quick brown fox jumps over the lazy dog";

    fn config(scratch: &Path) -> Config {
        Config {
            scratch_dir: scratch.to_path_buf(),
            ..Config::default()
        }
    }

    fn node(client: ClientHandle, scratch: &Path) -> Node {
        Node::new(client, &config(scratch))
    }

    fn remote() -> RemoteFile {
        RemoteFile::new("fox.txt", Checksum::of(CONTENT))
    }

    fn record(received: u64, transferred: u64, completed: bool) -> DownloadRecord {
        DownloadRecord {
            remote_path: PathBuf::from("fox.txt"),
            destination: PathBuf::from("/tmp/fox.txt"),
            offset: 0,
            length: 20,
            file_size: 20,
            received,
            total_data_transferred: transferred,
            completed,
            started: UtcDateTime::now(),
        }
    }

    #[rstest]
    #[case::pending(record(5, 10, false), vec![])]
    #[case::completed(record(20, 30, true), vec![])]
    #[case::overcounted(record(10, 5, false), vec![Violation::ReceivedExceedsTransferred { received: 10, transferred: 5 }])]
    #[case::premature(record(15, 15, true), vec![Violation::IncompleteCompletion { received: 15, length: 20 }])]
    #[case::truncated(
        DownloadRecord { file_size: 40, ..record(20, 20, true) },
        vec![Violation::LengthMismatch { length: 20, file_size: 40 }]
    )]
    fn test_violations_of_record(#[case] record: DownloadRecord, #[case] expected: Vec<Violation>) {
        let violations = Violations::of(&record);
        assert_eq!(violations.iter().copied().collect::<Vec<_>>(), expected);
        assert_eq!(DownloadInfo::new(record).is_consistent(), expected.is_empty());
    }

    #[test]
    fn test_violations_display_every_broken_invariant() {
        let broken = DownloadRecord { file_size: 40, ..record(25, 5, true) };
        let violations = Violations::of(&broken);
        assert_eq!(violations.len(), 3);
        assert_eq!(
            violations.to_string(),
            "filesize != length (40 != 20); received > transferred (25 > 5); completed == true but received != length (25 != 20)"
        );
    }

    #[tokio::test]
    async fn test_blocking_download_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(Arc::new(MockService::with_files([("fox.txt", CONTENT)])), dir.path());
        let local = node.download_to_disk(&remote(), DownloadMode::Blocking).await.unwrap();
        assert!(local.path().starts_with(dir.path()));
        assert_eq!(local.checksum(), remote().checksum());
        assert_eq!(tokio::fs::read(local.path()).await.unwrap(), CONTENT);
    }

    #[tokio::test]
    async fn test_corrupt_blocking_download_keeps_identity() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockService::with_files([("fox.txt", CONTENT)]));
        service.corrupt_downloads(true);
        let node = node(service, dir.path());

        let err = node.download_to_disk(&remote(), DownloadMode::Blocking).await.unwrap_err();
        let ErrorKind::CorruptDownload(local) = &*err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(local.path().is_file());
        let err = local.check_integrity().await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Integrity { .. }));
    }

    #[tokio::test]
    async fn test_download_untracked_file() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(Arc::new(MockService::default()), dir.path());
        let err = node.download_to_disk(&remote(), DownloadMode::Async).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Untracked(_)));
        let err = node.download_by_stream(&remote()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Untracked(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_download_then_wait() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![7u8; 4096];
        let service = MockService::with_files([("big.bin", data.clone())]).with_download_chunk(1024);
        let node = node(Arc::new(service), dir.path());
        let remote = RemoteFile::new("big.bin", Checksum::of(&data));

        let local = node.download_to_disk(&remote, DownloadMode::Async).await.unwrap();
        assert!(!local.path().exists());
        assert_eq!(node.wait_for_download(&local, &remote).await.unwrap(), DownloadOutcome::Completed);
        assert_eq!(tokio::fs::read(local.path()).await.unwrap(), data);

        let info = node.download_info(&local, &remote).await.unwrap().unwrap();
        assert!(info.record.completed);
        assert!(info.is_consistent());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_tolerates_transient_transport_failures() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![1u8; 3000];
        let service = MockService::with_files([("big.bin", data.clone())]).with_download_chunk(500);
        let flaky = FlakyClient::new(Arc::new(service), 2);
        let node = node(Arc::new(flaky), dir.path());
        let remote = RemoteFile::new("big.bin", Checksum::of(&data));

        let local = node.download_to_disk(&remote, DownloadMode::Async).await.unwrap();
        assert_eq!(node.wait_for_download(&local, &remote).await.unwrap(), DownloadOutcome::Completed);
    }

    #[tokio::test]
    async fn test_download_info_without_record_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(Arc::new(MockService::with_files([("fox.txt", CONTENT)])), dir.path());
        let local = LocalFile::new(dir.path().join("never"), remote().checksum());
        assert_eq!(node.download_info(&local, &remote()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_download_info_reports_inconsistent_record() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockService::default());
        service.insert_download(record(10, 5, false)).await;
        let node = node(service, dir.path());
        let local = LocalFile::new("/tmp/fox.txt", remote().checksum());

        let info = node.download_info(&local, &remote()).await.unwrap().unwrap();
        assert_eq!(info.record.received, 10);
        assert!(info.violations.contains(&Violation::ReceivedExceedsTransferred { received: 10, transferred: 5 }));
        let err = info.check().unwrap_err();
        let ErrorKind::Consistency(violations) = &*err else {
            panic!("unexpected error: {err:?}");
        };
        assert!(violations.to_string().contains("received > transferred"));
    }

    #[tokio::test]
    async fn test_downloads_distinguished_by_destination() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockService::with_files([("fox.txt", CONTENT)]).with_download_chunk(1);
        let node = node(Arc::new(service), dir.path());

        let first = node.download_to_disk(&remote(), DownloadMode::Async).await.unwrap();
        let second = node.download_to_disk(&remote(), DownloadMode::Async).await.unwrap();
        assert_ne!(first.path(), second.path());
        for local in [&first, &second] {
            let info = node.download_info(local, &remote()).await.unwrap().unwrap();
            assert_eq!(info.record.destination, local.path());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaped_download_is_not_observed() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockService::with_files([("fox.txt", CONTENT)]));
        let node = node(service.clone(), dir.path());

        let local = node.download_to_disk(&remote(), DownloadMode::Blocking).await.unwrap();
        assert_eq!(service.reap_downloads().await, 1);
        assert_eq!(node.wait_for_download(&local, &remote()).await.unwrap(), DownloadOutcome::NotObserved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_download_fails_integrity_check() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(Arc::new(MockService::with_files([("fox.txt", CONTENT)])), dir.path());
        let local = LocalFile::new(dir.path().join("never"), remote().checksum());
        let err = node.wait_for_download(&local, &remote()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::CorruptDownload(file) if file == &local));
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_wait_requires_observed_completion() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockService::with_files([("fox.txt", CONTENT)]));
        let mut config = config(dir.path());
        config.downloads.require_observed_completion = true;
        let node = Node::new(service.clone(), &config).with_poll(RetryPolicy::new(3, Duration::from_millis(10)));

        let local = node.download_to_disk(&remote(), DownloadMode::Blocking).await.unwrap();
        assert_eq!(node.wait_for_download(&local, &remote()).await.unwrap(), DownloadOutcome::Completed);

        service.reap_downloads().await;
        let start = tokio::time::Instant::now();
        let err = node.wait_for_download(&local, &remote()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ThresholdNotMet(Shortfall::DownloadNotObserved)));
        assert_eq!(start.elapsed(), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_wait_reports_received_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let service = MockService::with_files([("fox.txt", CONTENT)]).with_download_chunk(10);
        let node = node(Arc::new(service), dir.path()).with_poll(RetryPolicy::new(2, Duration::from_millis(10)));

        let local = node.download_to_disk(&remote(), DownloadMode::Async).await.unwrap();
        let err = node.wait_for_download(&local, &remote()).await.unwrap_err();
        let length = CONTENT.len() as u64;
        assert!(matches!(
            &*err,
            ErrorKind::ThresholdNotMet(Shortfall::Download { received: 20, length: l }) if *l == length
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inconsistent_record_fails_wait() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockService::default());
        service.insert_download(record(10, 5, false)).await;
        let node = node(service, dir.path()).with_poll(RetryPolicy::new(2, Duration::ZERO));
        let local = LocalFile::new("/tmp/fox.txt", remote().checksum());
        let err = node.wait_for_download(&local, &remote()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Consistency(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let node = node(Arc::new(MockService::default()), dir.path());
        let remote = node.upload_new_file_blocking(4096, 2, 2).await.unwrap();

        let data = node.download_by_stream(&remote).await.unwrap();
        let original = tokio::fs::read(dir.path().join(remote.path())).await.unwrap();
        assert_eq!(data.len(), 4096);
        assert_eq!(data, original);
    }

    #[tokio::test]
    async fn test_corrupt_stream_is_integrity_error() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockService::with_files([("fox.txt", CONTENT)]));
        service.corrupt_downloads(true);
        let node = node(service, dir.path());

        let err = node.download_by_stream(&remote()).await.unwrap_err();
        match &*err {
            ErrorKind::Integrity { subject, expected, .. } => {
                assert_eq!(subject, remote().path());
                assert_eq!(*expected, remote().checksum());
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_records_hold_invariants() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(MockService::with_files([("fox.txt", CONTENT)]).with_download_chunk(7));
        let node = node(service.clone(), dir.path());
        for mode in [DownloadMode::Blocking, DownloadMode::Async, DownloadMode::Async] {
            let local = node.download_to_disk(&remote(), mode).await.unwrap();
            node.wait_for_download(&local, &remote()).await.unwrap();
        }
        let records = service.download_records().await.unwrap();
        assert_eq!(records.len(), 3);
        for record in records.iter().filter(|r| r.completed) {
            assert_eq!(record.received, record.length);
            assert_eq!(record.length, record.file_size);
            assert!(record.received <= record.total_data_transferred);
        }
    }
}
